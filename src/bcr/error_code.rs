//! Error codes found in BCL replies.

pub const NO_ERROR: u8 = 0;

const TEXTS: [&str; 23] = [
    "unknown token",
    "data without token",
    "argument missing",
    "wrong device",
    "wrong revision",
    "missing revision",
    "internal error",
    "mode missing",
    "bad item index",
    "not a number",
    "value out of range",
    "invalid argument",
    "invalid command",
    "wrong number of arguments",
    "too much data",
    "already defined",
    "preset missing",
    "preset too complex",
    "wrong preset",
    "preset too new",
    "preset check",
    "sequence error",
    "wrong context",
];

/// Returns the firmware's description for `code`.
pub fn text(code: u8) -> &'static str {
    match code {
        NO_ERROR => "no error",
        code => TEXTS
            .get(code as usize - 1)
            .copied()
            .unwrap_or("unknown error"),
    }
}
