//! Shared-secret check for the admin dashboard.

use crate::system_log::SystemLog;

/// Compares submitted codes against the configured admin secret.
///
/// Fails closed: with no secret configured, nothing verifies.
pub struct AdminGate {
    secret: Option<String>,
    log: SystemLog,
}

impl AdminGate {
    pub fn new(secret: Option<String>, log: SystemLog) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            log,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, code: &str) -> bool {
        let valid = match self.secret {
            Some(ref secret) => constant_time_eq(secret.as_bytes(), code.as_bytes()),
            None => false,
        };
        if valid {
            self.log.info("Admin login verified");
        } else if self.secret.is_none() {
            self.log.warning("Admin login rejected: no admin code configured");
        } else {
            self.log.warning("Admin login rejected: invalid code");
        }
        valid
    }
}

impl std::fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate")
            .field("configured", &self.is_configured())
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
