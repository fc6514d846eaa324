mod check;
mod serve;

pub use check::run_config_check;
pub use serve::{build_manager, run_server};

use crate::error::Result;
use crate::security::{GuardedSecret, HashAlgorithm, SecretHash};
use std::io::BufRead;

/// Reads a shared secret from stdin and prints its `SecretHash` text, ready
/// for the `server.keyHash` setting.
pub fn run_hash_secret(algorithm: HashAlgorithm) -> Result<()> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);

    let secret = GuardedSecret::from_string(line)?;
    let hash = SecretHash::generate(&secret, algorithm)?;
    println!("{hash}");
    Ok(())
}
