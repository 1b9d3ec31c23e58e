//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success                                               |
//! | 1    | General error (unspecified)                           |
//! | 2    | CLI usage error (bad args, ledger already exists)     |
//! | 3    | Invalid input (bad date, bad field, bad sheet row)    |
//! | 4    | Referenced record not found                           |
//! | 5    | Ledger file could not be read or written              |
//! | 6    | Settings or engine config invalid                     |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `CliError`'s conversions

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, refusing to clobber a file.
pub const EXIT_USAGE: u8 = 2;

/// Input rejected by validation: malformed date, missing field, duplicate
/// name, or a bad row in an imported sheet.
pub const EXIT_INVALID_INPUT: u8 = 3;

/// A source, location, vehicle, category or entry that does not exist.
pub const EXIT_NOT_FOUND: u8 = 4;

/// Ledger file unreadable, unwritable, or from a newer version.
pub const EXIT_STORE: u8 = 5;

/// settings.toml missing (when named explicitly), unparseable, or failing validation.
pub const EXIT_CONFIG: u8 = 6;
