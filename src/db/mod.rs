pub mod postgres;

use crate::config::{CredentialSet, Credentials};
use crate::error::{ExtractError, Result};
use tracing::{debug, info};

/// Opens sessions against one kind of database.
pub trait Driver {
    type Session: Session;

    fn open(&self, credentials: &Credentials) -> Result<Self::Session>;
}

/// A single open connection. Dropping it closes the connection.
pub trait Session {
    fn execute_query(&mut self, query: &str) -> Result<QueryResult>;
}

/// Rows materialized from one query, in the order the server returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub struct Connector<D: Driver> {
    driver: D,
    credentials: Credentials,
}

impl<D: Driver> Connector<D> {
    /// Validates the credential set and checks connectivity once before
    /// returning. Missing keys fail before the driver is touched.
    pub fn new(driver: D, credentials: &CredentialSet) -> Result<Self> {
        let credentials = Credentials::from_set(credentials)?;
        let connector = Self {
            driver,
            credentials,
        };

        info!(url = %connector.credentials.redacted_url(), "checking database connectivity");
        drop(connector.connect()?);
        debug!("connectivity check passed");

        Ok(connector)
    }

    fn connect(&self) -> Result<D::Session> {
        self.driver.open(&self.credentials)
    }

    /// Runs `query` on a fresh connection and collects every row.
    pub fn fetch_data(&self, query: &str) -> Result<QueryResult> {
        debug!(query, "executing query");
        let mut session = self.connect()?;
        let result = session.execute_query(query)?;
        debug!(
            columns = result.columns.len(),
            rows = result.row_count(),
            "query complete"
        );
        Ok(result)
    }

    /// `SELECT *` over `table_name`, which may be schema-qualified.
    pub fn extract_table(&self, table_name: &str) -> Result<QueryResult> {
        let query = format!("SELECT * FROM {};", quote_table_name(table_name)?);
        info!(table = table_name, "extracting table");
        self.fetch_data(&query)
    }
}

/// Quotes `table` or `schema.table` as PostgreSQL identifiers.
pub fn quote_table_name(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(ExtractError::Config(format!(
            "table name `{name}` has too many qualifiers"
        )));
    }

    let mut quoted = Vec::with_capacity(parts.len());
    for part in parts {
        if part.is_empty() || part.contains('\0') {
            return Err(ExtractError::Config(format!("invalid table name `{name}`")));
        }
        quoted.push(format!("\"{}\"", part.replace('"', "\"\"")));
    }
    Ok(quoted.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RDS_HOST, RDS_NAME, RDS_PASS, RDS_PORT, RDS_USERNAME};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        opened: Cell<usize>,
        closed: Cell<usize>,
        queries: RefCell<Vec<String>>,
    }

    struct FakeDriver {
        recorder: Rc<Recorder>,
        fail_query: bool,
    }

    struct FakeSession {
        recorder: Rc<Recorder>,
        fail_query: bool,
    }

    impl Driver for FakeDriver {
        type Session = FakeSession;

        fn open(&self, _credentials: &Credentials) -> Result<FakeSession> {
            self.recorder.opened.set(self.recorder.opened.get() + 1);
            Ok(FakeSession {
                recorder: Rc::clone(&self.recorder),
                fail_query: self.fail_query,
            })
        }
    }

    impl Session for FakeSession {
        fn execute_query(&mut self, query: &str) -> Result<QueryResult> {
            self.recorder.queries.borrow_mut().push(query.to_string());
            if self.fail_query {
                return Err(ExtractError::Query {
                    query: query.to_string(),
                    source: "relation does not exist".into(),
                });
            }
            let mut result = QueryResult::new(vec!["id".into(), "status".into()]);
            result.rows.push(vec![Some("1".into()), Some("paid".into())]);
            Ok(result)
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.recorder.closed.set(self.recorder.closed.get() + 1);
        }
    }

    fn credentials() -> CredentialSet {
        [
            (RDS_USERNAME, "u"),
            (RDS_PASS, "p"),
            (RDS_HOST, "localhost"),
            (RDS_PORT, "5432"),
            (RDS_NAME, "db"),
        ]
        .into_iter()
        .collect()
    }

    fn driver(fail_query: bool) -> (FakeDriver, Rc<Recorder>) {
        let recorder = Rc::new(Recorder::default());
        (
            FakeDriver {
                recorder: Rc::clone(&recorder),
                fail_query,
            },
            recorder,
        )
    }

    #[test]
    fn construction_checks_connectivity_once() {
        let (driver, recorder) = driver(false);
        Connector::new(driver, &credentials()).unwrap();
        assert_eq!(recorder.opened.get(), 1);
        assert_eq!(recorder.closed.get(), 1);
        assert!(recorder.queries.borrow().is_empty());
    }

    #[test]
    fn missing_key_fails_before_driver_is_used() {
        let (driver, recorder) = driver(false);
        let partial: CredentialSet = [(RDS_USERNAME, "u"), (RDS_PASS, "p")].into_iter().collect();
        let err = Connector::new(driver, &partial).err().unwrap();
        assert!(err.is_config());
        assert_eq!(recorder.opened.get(), 0);
    }

    #[test]
    fn extract_table_quotes_identifier() {
        let (driver, recorder) = driver(false);
        let connector = Connector::new(driver, &credentials()).unwrap();
        let result = connector.extract_table("loan_payments").unwrap();
        assert_eq!(result.columns, vec!["id", "status"]);
        assert_eq!(
            recorder.queries.borrow().as_slice(),
            ["SELECT * FROM \"loan_payments\";"]
        );
    }

    #[test]
    fn connection_released_when_query_fails() {
        let (driver, recorder) = driver(true);
        let connector = Connector::new(driver, &credentials()).unwrap();
        let err = connector.fetch_data("SELECT * FROM nope").unwrap_err();
        assert!(matches!(err, ExtractError::Query { .. }));
        assert_eq!(recorder.opened.get(), 2);
        assert_eq!(recorder.closed.get(), 2);
    }

    #[test]
    fn invalid_table_name_never_reaches_the_database() {
        let (driver, recorder) = driver(false);
        let connector = Connector::new(driver, &credentials()).unwrap();
        for name in ["", "a.b.c", ".t", "t\0"] {
            assert!(connector.extract_table(name).unwrap_err().is_config());
        }
        assert_eq!(recorder.opened.get(), 1);
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_table_name("public.loans").unwrap(), "\"public\".\"loans\"");
        assert_eq!(
            quote_table_name("x\"; DROP TABLE y; --").unwrap(),
            "\"x\"\"; DROP TABLE y; --\""
        );
    }
}
