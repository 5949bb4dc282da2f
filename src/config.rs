//! Ambient configuration: `.env` loading, verbosity
//! resolution, and the metadata-path override hook.
//!
//! `gitcuttle` has exactly one persistent document (the metadata store, see
//! [`crate::metadata`]), so there is no project-level configuration file to
//! load here.

/// Loads a `.env` file from the current directory, if present, before
/// argument parsing. A missing `.env` file is not an error.
pub fn load_dotenv() {
    let _ = dotenv::dotenv();
}

/// Resolves the effective verbosity: the `-v`/`--verbose` flag, or
/// `GITCUTTLE_VERBOSE` when set to any non-empty value.
pub fn verbose_requested(flag: bool) -> bool {
    if flag {
        return true;
    }
    std::env::var("GITCUTTLE_VERBOSE").map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_alone_enables_verbosity() {
        assert!(verbose_requested(true));
    }
}
