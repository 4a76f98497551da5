//! Compact string constants used to tag messages.
//!
//! An [`Atom`] packs up to ten characters from `[0-9A-Za-z_ ]` into a
//! `u64` (6 bits per character) so that tags compare as integers and
//! can be built in `const` context:
//!
//! ```
//! use hew_actors::{atom, Atom};
//!
//! const ADD: Atom = atom("add");
//! assert_eq!(ADD.to_string(), "add");
//! assert_ne!(ADD, atom("sub"));
//! ```

use std::fmt;

/// Maximum number of characters an atom can hold.
pub const MAX_ATOM_LEN: usize = 10;

/// Encoding table: index is the 6-bit code, value the character.
/// Code 0 is reserved as the padding value.
const DECODING_TABLE: &[u8; 64] =
    b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const fn encode_char(c: u8) -> u64 {
    let mut i = 1;
    while i < DECODING_TABLE.len() {
        if DECODING_TABLE[i] == c {
            return i as u64;
        }
        i += 1;
    }
    // Unknown characters collapse to the space code.
    0
}

/// A short string constant stored as an integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Atom(u64);

/// Build an atom from `name`. Characters past [`MAX_ATOM_LEN`] are ignored.
#[must_use]
pub const fn atom(name: &str) -> Atom {
    let bytes = name.as_bytes();
    let mut value: u64 = 0xF;
    let mut i = 0;
    while i < bytes.len() && i < MAX_ATOM_LEN {
        value = (value << 6) | encode_char(bytes[i]);
        i += 1;
    }
    Atom(value)
}

impl Atom {
    /// The raw encoded value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; MAX_ATOM_LEN];
        let mut len = 0;
        let mut v = self.0;
        // Characters are stored most-significant first; peel them off
        // from the bottom until only the 0xF start marker remains.
        while v > 0xF && len < MAX_ATOM_LEN {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "masked to 6 bits, always a valid table index"
            )]
            let code = (v & 0x3F) as usize;
            buf[len] = DECODING_TABLE[code];
            len += 1;
            v >>= 6;
        }
        buf[..len].reverse();
        f.write_str(&String::from_utf8_lossy(&buf[..len]))
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "atom(\"{self}\")")
    }
}
