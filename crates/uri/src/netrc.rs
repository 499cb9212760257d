//! Minimal `~/.netrc` lookup for authenticated HTTP downloads.

use std::fs;

/// Login and password for `host` from the user's `~/.netrc`, if any.
pub fn credentials_for_host(host: &str) -> Option<(String, String)> {
    let home = dirs_next::home_dir()?;
    let content = fs::read_to_string(home.join(".netrc")).ok()?;
    parse_netrc(&content, host)
}

/// Find the `login`/`password` pair for `host` in netrc-formatted text.
///
/// A `machine` entry matching `host` wins; otherwise a `default` entry is
/// used. `macdef` bodies and `account` values are skipped.
pub fn parse_netrc(content: &str, host: &str) -> Option<(String, String)> {
    let mut tokens = content.split_whitespace();
    let mut fallback: Option<(String, String)> = None;
    let mut current: Option<Entry> = None;
    let mut finished: Vec<Entry> = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                finished.extend(current.take());
                current = tokens.next().map(Entry::named);
            }
            "default" => {
                finished.extend(current.take());
                current = Some(Entry::default_entry());
            }
            "login" => {
                if let (Some(entry), Some(value)) = (current.as_mut(), tokens.next()) {
                    entry.login = Some(value.to_string());
                }
            }
            "password" => {
                if let (Some(entry), Some(value)) = (current.as_mut(), tokens.next()) {
                    entry.password = Some(value.to_string());
                }
            }
            "account" => {
                tokens.next();
            }
            "macdef" => {
                // Macro bodies run until a blank line, which whitespace
                // splitting cannot see; drop the entry being built instead.
                current = None;
            }
            _ => {}
        }
    }
    finished.extend(current);

    for entry in finished {
        let Some(credentials) = entry.credentials() else {
            continue;
        };
        match entry.machine.as_deref() {
            Some(machine) if machine.eq_ignore_ascii_case(host) => return Some(credentials),
            None if fallback.is_none() => fallback = Some(credentials),
            _ => {}
        }
    }
    fallback
}

#[derive(Debug, Default)]
struct Entry {
    /// `None` for the `default` entry.
    machine: Option<String>,
    login: Option<String>,
    password: Option<String>,
}

impl Entry {
    fn named(machine: &str) -> Self {
        Self {
            machine: Some(machine.to_string()),
            ..Self::default()
        }
    }

    fn default_entry() -> Self {
        Self::default()
    }

    fn credentials(&self) -> Option<(String, String)> {
        Some((self.login.clone()?, self.password.clone()?))
    }
}
