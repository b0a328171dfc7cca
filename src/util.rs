//! # Response Parsing Utilities
//!
//! Cursor-based helpers for picking apart modem output: substring search,
//! bounded decimal fields and quoted strings.
//!
//! Every reader distinguishes "the bytes are not there yet" from "the bytes
//! are there and wrong", because modem output is inspected while it is
//! still arriving.

/// Why a field could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanError {
    /// Ran off the end of the received data.
    Incomplete,
    /// The data present does not have the expected shape.
    Malformed,
}

/// Longest decimal field accepted. Five digits cover every length the modem
/// can report without any risk of overflow.
pub const MAX_DECIMAL_DIGITS: usize = 5;

/// Returns the offset of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_from(haystack, needle, 0)
}

/// Like [`find`], starting the search at `from`.
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Consumes `expected` at the cursor.
pub fn expect_byte(cursor: &mut usize, buf: &[u8], expected: u8) -> Result<(), ScanError> {
    match buf.get(*cursor) {
        None => Err(ScanError::Incomplete),
        Some(&b) if b == expected => {
            *cursor += 1;
            Ok(())
        }
        Some(_) => Err(ScanError::Malformed),
    }
}

/// Reads an unsigned decimal field terminated by `terminator`, advancing the
/// cursor past the terminator.
///
/// Rejects an empty field, any non-digit before the terminator and runs of
/// more than [`MAX_DECIMAL_DIGITS`] digits.
pub fn read_decimal(cursor: &mut usize, buf: &[u8], terminator: u8) -> Result<usize, ScanError> {
    let mut value: usize = 0;
    let mut digits = 0;
    loop {
        let b = *buf.get(*cursor + digits).ok_or(ScanError::Incomplete)?;
        if b == terminator {
            break;
        }
        if !b.is_ascii_digit() || digits == MAX_DECIMAL_DIGITS {
            return Err(ScanError::Malformed);
        }
        value = value * 10 + usize::from(b - b'0');
        digits += 1;
    }
    if digits == 0 {
        return Err(ScanError::Malformed);
    }
    *cursor += digits + 1;
    Ok(value)
}

/// Reads a double-quoted UTF-8 string, advancing the cursor past the closing
/// quote. At most `max_len` bytes are accepted between the quotes.
pub fn read_quoted<'a>(
    cursor: &mut usize,
    buf: &'a [u8],
    max_len: usize,
) -> Result<&'a str, ScanError> {
    expect_byte(cursor, buf, b'"')?;
    let start = *cursor;
    let mut end = start;
    loop {
        match buf.get(end) {
            None => {
                return if end - start > max_len {
                    Err(ScanError::Malformed)
                } else {
                    Err(ScanError::Incomplete)
                };
            }
            Some(b'"') => break,
            Some(b'\r' | b'\n') => return Err(ScanError::Malformed),
            Some(_) => end += 1,
        }
    }
    if end - start > max_len {
        return Err(ScanError::Malformed);
    }
    let s = core::str::from_utf8(&buf[start..end]).map_err(|_| ScanError::Malformed)?;
    *cursor = end + 1;
    Ok(s)
}

/// Parses the leading decimal field of a comma separated status line such
/// as `0,4,1,"host",...`, skipping `skip` fields first.
pub fn nth_decimal_field(line: &[u8], skip: usize) -> Option<usize> {
    let field = line.split(|&b| b == b',').nth(skip)?;
    let field = field.trim_ascii();
    if field.is_empty() || field.len() > MAX_DECIMAL_DIGITS {
        return None;
    }
    field.iter().try_fold(0usize, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + usize::from(b - b'0'))
    })
}
