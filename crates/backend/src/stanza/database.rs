use serde_json::json;
use wharf_types::{ConfigFragment, DatabaseParams};

use super::{StanzaGenerator, StanzaKind, fragment};

const MYSQL_PROFILE: &str = "slick.jdbc.MySQLProfile$";
const MYSQL_DRIVER: &str = "com.mysql.cj.jdbc.Driver";
const HSQLDB_PROFILE: &str = "slick.jdbc.HsqldbProfile$";
const HSQLDB_DRIVER: &str = "org.hsqldb.jdbcDriver";

/// Metadata database connection.
///
/// MySQL is used when host, port, user and password are all present.
/// Otherwise a file-backed HyperSQL database is used when a path is given.
/// With neither, the engine keeps its in-memory default and no stanza is
/// emitted.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseStanza<'a> {
    params: &'a DatabaseParams,
}

impl<'a> DatabaseStanza<'a> {
    pub fn new(params: &'a DatabaseParams) -> Self {
        Self { params }
    }
}

impl StanzaGenerator for DatabaseStanza<'_> {
    fn kind(&self) -> StanzaKind {
        StanzaKind::Database
    }

    fn is_enabled(&self) -> bool {
        self.params.has_mysql_credentials() || self.params.file_db.is_some()
    }

    fn generate(&self) -> ConfigFragment {
        let params = self.params;
        if let (Some(host), Some(port), Some(user), Some(password)) = (
            params.mysql_host.as_deref(),
            params.mysql_port,
            params.mysql_user.as_deref(),
            params.mysql_password.as_deref(),
        ) {
            return fragment(json!({
                "database": {
                    "profile": MYSQL_PROFILE,
                    "db": {
                        "url": format!(
                            "jdbc:mysql://{host}:{port}/cromwell?allowPublicKeyRetrieval=true&useSSL=false&rewriteBatchedStatements=true&serverTimezone=UTC"
                        ),
                        "user": user,
                        "password": password,
                        "driver": MYSQL_DRIVER,
                        "connectionTimeout": params.timeout_ms
                    }
                }
            }));
        }

        match params.file_db.as_deref() {
            Some(path) => fragment(json!({
                "database": {
                    "profile": HSQLDB_PROFILE,
                    "db": {
                        "url": format!("jdbc:hsqldb:file:{};shutdown=false;hsqldb.tx=mvcc", path.display()),
                        "driver": HSQLDB_DRIVER,
                        "connectionTimeout": params.timeout_ms
                    }
                }
            })),
            None => ConfigFragment::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::merge::get_path;

    #[test]
    fn mysql_wins_when_credentials_are_complete() {
        let params = DatabaseParams {
            mysql_host: Some("db.internal".into()),
            mysql_port: Some(3307),
            mysql_user: Some("cromwell".into()),
            mysql_password: Some("secret".into()),
            file_db: Some(PathBuf::from("/tmp/db")),
            ..DatabaseParams::default()
        };
        let stanza = DatabaseStanza::new(&params);
        assert!(stanza.is_enabled());
        let fragment = stanza.generate();
        let url = get_path(&fragment, "database.db.url").and_then(|value| value.as_str()).unwrap();
        assert!(url.starts_with("jdbc:mysql://db.internal:3307/cromwell?"));
        assert_eq!(get_path(&fragment, "database.db.driver"), Some(&json!(MYSQL_DRIVER)));
    }

    #[test]
    fn host_alone_produces_no_stanza() {
        let params = DatabaseParams {
            mysql_host: Some("db.internal".into()),
            ..DatabaseParams::default()
        };
        let stanza = DatabaseStanza::new(&params);
        assert!(!stanza.is_enabled());
        assert!(stanza.generate().is_empty());
    }

    #[test]
    fn file_db_falls_back_to_hsqldb() {
        let params = DatabaseParams {
            file_db: Some(PathBuf::from("/data/wharf.db")),
            ..DatabaseParams::default()
        };
        let fragment = DatabaseStanza::new(&params).generate();
        assert_eq!(
            get_path(&fragment, "database.db.url"),
            Some(&json!("jdbc:hsqldb:file:/data/wharf.db;shutdown=false;hsqldb.tx=mvcc"))
        );
        assert_eq!(get_path(&fragment, "database.profile"), Some(&json!(HSQLDB_PROFILE)));
    }
}
