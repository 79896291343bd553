use bytes::{BufMut, BytesMut};

const TERMINATOR: &[u8] = b"\r\n";

/// Errors raised while decoding a RESP frame.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RespError {
    /// The buffer ends before the frame does; read more and retry.
    #[error("incomplete frame")]
    Incomplete,
    #[error("invalid frame: {0}")]
    Invalid(&'static str),
    #[error("invalid RESP tag {0:#04x}")]
    UnknownTag(u8),
    #[error("frame is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, PartialEq, Clone)]
pub enum RespValue<'data> {
    SimpleString(&'data str),
    SimpleError(&'data str),
    Integer(i64),
    OwnedBulkString(String),
    BulkString(&'data str),
    NullBulkString,
    Array(Vec<RespValue<'data>>),
    NullArray,
    Null,
}

impl<'data> RespValue<'data> {
    fn tag(&self) -> u8 {
        match self {
            RespValue::SimpleString(_) => b'+',
            RespValue::SimpleError(_) => b'-',
            RespValue::Integer(_) => b':',
            RespValue::OwnedBulkString(_) => b'$',
            RespValue::BulkString(_) => b'$',
            RespValue::NullBulkString => b'$',
            RespValue::Array(_) => b'*',
            RespValue::NullArray => b'*',
            RespValue::Null => b'_',
        }
    }

    fn has_final_terminator(&self) -> bool {
        !matches!(self, RespValue::Array(_))
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
        match self {
            RespValue::SimpleString(s) | RespValue::SimpleError(s) => {
                buf.put(s.as_bytes());
            }
            RespValue::Integer(n) => {
                buf.put(n.to_string().as_bytes());
            }
            RespValue::OwnedBulkString(s) => {
                put_bulk(buf, s);
            }
            RespValue::BulkString(s) => {
                put_bulk(buf, s);
            }
            RespValue::NullBulkString | RespValue::NullArray => {
                buf.put(&b"-1"[..]);
            }
            RespValue::Array(elements) => {
                buf.put(elements.len().to_string().as_bytes());
                buf.put(TERMINATOR);
                for e in elements.iter() {
                    e.serialize(buf);
                }
            }
            RespValue::Null => {}
        }
        if self.has_final_terminator() {
            buf.put(TERMINATOR);
        }
    }

    /// Decode one value from the front of `data`, returning it together with
    /// the unconsumed remainder.
    pub fn deserialize(data: &'data [u8]) -> Result<(Self, &'data [u8]), RespError> {
        if data.is_empty() {
            return Err(RespError::Incomplete);
        }
        let terminator_index = find_terminator(data).ok_or(RespError::Incomplete)?;
        let header = &data[1..terminator_index];
        let rest = &data[terminator_index + 2..];

        match data[0] {
            b'+' => {
                // Simple string: "+OK\r\n"
                Ok((RespValue::SimpleString(std::str::from_utf8(header)?), rest))
            }
            b'-' => {
                // Simple error: "-ERR message\r\n"
                Ok((RespValue::SimpleError(std::str::from_utf8(header)?), rest))
            }
            b':' => {
                // Integer: ":[<+|->]<value>\r\n"
                let n = std::str::from_utf8(header)?
                    .parse::<i64>()
                    .map_err(|_| RespError::Invalid("invalid integer"))?;
                Ok((RespValue::Integer(n), rest))
            }
            b'$' => {
                // Bulk string: "$<length>\r\n<data>\r\n"
                let digits = std::str::from_utf8(header)?;
                if digits == "-1" {
                    return Ok((RespValue::NullBulkString, rest));
                }
                let len = digits
                    .parse::<usize>()
                    .map_err(|_| RespError::Invalid("invalid bulk string length"))?;
                let end = len
                    .checked_add(TERMINATOR.len())
                    .ok_or(RespError::Invalid("bulk string length overflow"))?;
                if rest.len() < end {
                    return Err(RespError::Incomplete);
                }
                if &rest[len..end] != TERMINATOR {
                    return Err(RespError::Invalid("unterminated bulk string"));
                }
                let string = std::str::from_utf8(&rest[..len])?;
                Ok((RespValue::BulkString(string), &rest[end..]))
            }
            b'*' => {
                // Array: "*<number-of-elements>\r\n<element-1>...<element-n>"
                let digits = std::str::from_utf8(header)?;
                if digits == "-1" {
                    return Ok((RespValue::NullArray, rest));
                }
                let num_elements = digits
                    .parse::<usize>()
                    .map_err(|_| RespError::Invalid("invalid array length"))?;
                // Every element takes at least three bytes.
                let mut rest = rest;
                let mut elements = Vec::with_capacity(num_elements.min(rest.len() / 3));
                for _ in 0..num_elements {
                    let (element, remainder) = RespValue::deserialize(rest)?;
                    elements.push(element);
                    rest = remainder;
                }
                Ok((RespValue::Array(elements), rest))
            }
            b'_' => {
                // Null: "_\r\n"
                if header.is_empty() {
                    Ok((RespValue::Null, rest))
                } else {
                    Err(RespError::Invalid("non-empty null"))
                }
            }
            tag => Err(RespError::UnknownTag(tag)),
        }
    }
}

fn put_bulk(buf: &mut BytesMut, s: &str) {
    buf.put(s.len().to_string().as_bytes());
    buf.put(TERMINATOR);
    buf.put(s.as_bytes());
}

/// Find `Some(index)` of the first occurence of b'\r\n' in the slice,
/// or `None` if the slice doesn't contain a terminator.
fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{find_terminator, RespError, RespValue};

    #[test]
    fn test_find_terminator() {
        assert_eq!(find_terminator(b"\r\n"), Some(0));
        assert_eq!(find_terminator(b"foo\r\nbar"), Some(3));
        assert_eq!(find_terminator(b"\r"), None);
        assert_eq!(find_terminator(b"\n"), None);
        assert_eq!(find_terminator(b"foo"), None);
        assert_eq!(find_terminator(b""), None);
    }

    #[test]
    fn simple_string() {
        let data = b"+PONG\r\n";
        let (value, rest) = RespValue::deserialize(&data[..]).unwrap();
        assert_eq!(value, RespValue::SimpleString("PONG"));
        assert!(rest.is_empty());
        let mut buf = BytesMut::new();
        value.serialize(&mut buf);
        assert_eq!(&buf[..], data);

        assert_eq!(
            RespValue::deserialize(b"+ENDLESS"),
            Err(RespError::Incomplete)
        );
    }

    #[test]
    fn simple_error() {
        let data = b"-WRONGTYPE Operation against a key\r\n";
        let (value, rest) = RespValue::deserialize(&data[..]).unwrap();
        assert_eq!(
            value,
            RespValue::SimpleError("WRONGTYPE Operation against a key")
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn integer() {
        let (value, _) = RespValue::deserialize(b":-2\r\n").unwrap();
        assert_eq!(value, RespValue::Integer(-2));

        let (value, _) = RespValue::deserialize(b":300\r\n").unwrap();
        assert_eq!(value, RespValue::Integer(300));

        assert!(matches!(
            RespValue::deserialize(b":3.14\r\n"),
            Err(RespError::Invalid(_))
        ));
    }

    #[test]
    fn null() {
        let (value, rest) = RespValue::deserialize(b"_\r\n").unwrap();
        assert_eq!(value, RespValue::Null);
        assert!(rest.is_empty());

        assert!(matches!(
            RespValue::deserialize(b"_foo\r\n"),
            Err(RespError::Invalid(_))
        ));
    }

    #[test]
    fn bulk_string() {
        let data = b"$5\r\nhello\r\n";
        let (value, rest) = RespValue::deserialize(&data[..]).unwrap();
        assert_eq!(value, RespValue::BulkString("hello"));
        assert!(rest.is_empty());
        let mut buf = BytesMut::new();
        value.serialize(&mut buf);
        assert_eq!(&buf[..], data);

        // Empty bulk string
        let (value, _) = RespValue::deserialize(b"$0\r\n\r\n").unwrap();
        assert_eq!(value, RespValue::BulkString(""));

        // Null bulk string
        let (value, _) = RespValue::deserialize(b"$-1\r\n").unwrap();
        assert_eq!(value, RespValue::NullBulkString);
    }

    #[test]
    fn bulk_string_split_across_reads() {
        assert_eq!(
            RespValue::deserialize(b"$11\r\n[{\"id\":"),
            Err(RespError::Incomplete)
        );
        assert_eq!(
            RespValue::deserialize(b"$2\r\nab"),
            Err(RespError::Incomplete)
        );
        assert!(matches!(
            RespValue::deserialize(b"$2\r\nabcd\r\n"),
            Err(RespError::Invalid(_))
        ));
    }

    #[test]
    fn array() {
        let data = b"*3\r\n$3\r\nSET\r\n$4\r\nkey1\r\n$2\r\n[]\r\n";
        let (value, rest) = RespValue::deserialize(&data[..]).unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::BulkString("SET"),
                RespValue::BulkString("key1"),
                RespValue::BulkString("[]"),
            ])
        );
        assert!(rest.is_empty());
        let mut buf = BytesMut::new();
        value.serialize(&mut buf);
        assert_eq!(&buf[..], data);

        let (value, _) = RespValue::deserialize(b"*-1\r\n").unwrap();
        assert_eq!(value, RespValue::NullArray);

        // Second element not yet received
        assert_eq!(
            RespValue::deserialize(b"*2\r\n+hello\r\n"),
            Err(RespError::Incomplete)
        );
    }

    #[test]
    fn oversized_lengths() {
        assert_eq!(
            RespValue::deserialize(b"$18446744073709551615\r\nab\r\n"),
            Err(RespError::Invalid("bulk string length overflow"))
        );
        assert_eq!(
            RespValue::deserialize(b"$18446744073709551614\r\nab\r\n"),
            Err(RespError::Incomplete)
        );
        assert_eq!(
            RespValue::deserialize(b"*18446744073709551615\r\n+a\r\n"),
            Err(RespError::Incomplete)
        );
    }

    #[test]
    fn pipelined_frames_leave_remainder() {
        let (first, rest) = RespValue::deserialize(b"+OK\r\n:1\r\n").unwrap();
        assert_eq!(first, RespValue::SimpleString("OK"));
        let (second, rest) = RespValue::deserialize(rest).unwrap();
        assert_eq!(second, RespValue::Integer(1));
        assert!(rest.is_empty());
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(
            RespValue::deserialize(b"%1\r\n"),
            Err(RespError::UnknownTag(b'%'))
        );
    }
}
