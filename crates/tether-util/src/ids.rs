//! Unique endpoint names for tether channels
//!
//! A channel name has to be unique per supervisor instance so that two
//! supervisors launched at the same time never collide on the same socket
//! path. The name embeds the process id and a random salt; this is
//! collision-improbable, not cryptographic.

use uuid::Uuid;

/// Length of the random salt fragment in an endpoint name
const SALT_LEN: usize = 8;

/// Generate a short random salt for endpoint names.
pub fn endpoint_salt() -> String {
    let mut salt = Uuid::new_v4().simple().to_string();
    salt.truncate(SALT_LEN);
    salt
}

/// Build an endpoint name unique to this process: `<prefix>-<pid>-<salt>`.
pub fn unique_endpoint_name(prefix: &str) -> String {
    format!("{}-{}-{}", prefix, std::process::id(), endpoint_salt())
}
