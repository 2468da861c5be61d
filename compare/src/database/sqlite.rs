use super::{
    documents, util::sqlite_path, ComputeResult, ConnectionError, Metadata, QueryAdapter,
};
use crate::benchmarks::ComputeSpec;
use parking_lot::{lock_api::ArcMutexGuard, FairMutex, RawFairMutex};
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use std::sync::Arc;
#[cfg(test)]
use std::path::Path;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
/// Transparent, thread safe wrapper over `InnerConnection`
pub struct SharedConnection(Arc<FairMutex<InnerConnection>>);

#[derive(Debug)]
pub struct InnerConnection {
    connection: Connection,
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(error: rusqlite::Error) -> Self {
        ConnectionError::SQLite(error)
    }
}

impl SharedConnection {
    pub fn new(inner_connection: InnerConnection) -> Self {
        Self(Arc::new(FairMutex::new(inner_connection)))
    }

    fn lock(&self) -> ArcMutexGuard<RawFairMutex, InnerConnection> {
        self.0.lock_arc()
    }

    /// open an existing store read only
    pub fn load(url: &str) -> Result<Self, ConnectionError> {
        Ok(Self::new(InnerConnection::load(url)?))
    }

    /// open (and create if needed) a writable store with the schema applied,
    /// only fixtures write documents
    #[cfg(test)]
    pub fn create(path: &Path) -> Result<Self, ConnectionError> {
        let mut inner = InnerConnection {
            connection: Connection::open(path)?,
        };
        inner.init()?;

        Ok(Self::new(inner))
    }

    #[cfg(test)]
    pub fn store_iter<'a, I: Iterator<Item = (&'a str, &'a str, &'a Value)>>(
        &self,
        documents: I,
    ) -> Result<(), ConnectionError> {
        self.lock().store_iter(documents)
    }

    pub fn documents(&self, run: &str, index: &str) -> Result<Vec<Value>, ConnectionError> {
        self.lock().documents(run, index)
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match Arc::try_unwrap(self.0) {
            Ok(inner) => inner.into_inner().close(),
            // other clones still hold the connection, it closes with the last one
            Err(_) => Ok(()),
        }
    }
}

impl InnerConnection {
    /// apply the document schema, statements are idempotent
    #[cfg(test)]
    pub fn init(&mut self) -> Result<(), ConnectionError> {
        for (position, statement) in SQL_SCHEMA.iter().enumerate() {
            if let Err(error) = self.connection.execute(statement, []) {
                error!(error = ?error, statement, "Schema statement {}/{SQL_SCHEMA_NUMBER} failed: {error}", position + 1);

                return Err(ConnectionError::SQLite(error));
            }

            debug!("Schema statement {}/{SQL_SCHEMA_NUMBER} applied", position + 1);
        }

        Ok(())
    }

    pub fn close(mut self) -> Result<(), ConnectionError> {
        let mut attempts = 0;

        while let Err((connection, error)) = self.connection.close() {
            attempts += 1;
            self.connection = connection;
            warn!(error = ?error, "Store did not close: {error}, attempt {attempts}/{CLOSE_ATTEMPTS}");

            if attempts == CLOSE_ATTEMPTS {
                error!("Giving up on closing the SQLite store");

                return Err(ConnectionError::SQLite(error));
            }
        }

        debug!("SQLite store closed");

        Ok(())
    }

    pub fn load(url: &str) -> Result<Self, ConnectionError> {
        let path = sqlite_path(url);

        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|error| ConnectionError::Connect {
            url: url.to_owned(),
            reason: error.to_string(),
        })?;

        info!(path = ?path, "Opened SQLite store");

        Ok(Self { connection })
    }

    /// all documents of `run` in `index`, an empty index counts as missing data
    pub fn documents(&self, run: &str, index: &str) -> Result<Vec<Value>, ConnectionError> {
        let documents = self
            .connection
            .prepare_cached("select body from documents where idx = ? and uuid = ? order by id")?
            .query_map(params![index, run], |row| row.get::<_, String>(0))?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(serde_json::from_str(&result?)?);

                Ok::<Vec<Value>, ConnectionError>(init)
            })?;

        debug!(run, index, count = documents.len(), "Loaded documents");

        if documents.is_empty() {
            Err(ConnectionError::MissingRunData {
                run: run.to_owned(),
                index: index.to_owned(),
            })
        } else {
            Ok(documents)
        }
    }

    #[cfg(test)]
    pub fn store_iter<'a, I: Iterator<Item = (&'a str, &'a str, &'a Value)>>(
        &self,
        mut documents: I,
    ) -> Result<(), ConnectionError> {
        let mut counter = 0;

        // NOTE: no nested transactions, the connection is only ever used behind the lock
        let mut tx = self.connection.unchecked_transaction()?;
        tx.set_drop_behavior(rusqlite::DropBehavior::Rollback);
        documents.try_for_each(|(index, run, body)| -> Result<(), ConnectionError> {
            counter += 1;
            let id: i64 = tx
                .prepare_cached(
                    "insert into documents (idx, uuid, body) values (?, ?, ?) returning id",
                )?
                .query_row(params![index, run, body.to_string()], |row| row.get(0))?;

            debug!(id = id, "Inserted document");

            Ok(())
        })?;
        tx.commit()?;

        info!("Stored {counter} documents");

        Ok(())
    }
}

impl QueryAdapter for SharedConnection {
    fn emit_compare(
        &self,
        run: &str,
        index: &str,
        fields: &[String],
    ) -> Result<Metadata, ConnectionError> {
        let found = self.documents(run, index)?;

        Ok(documents::compare_fields(&found, fields))
    }

    fn emit_compute(
        &self,
        run: &str,
        index: &str,
        spec: &ComputeSpec,
    ) -> Result<ComputeResult, ConnectionError> {
        let found = self.documents(run, index)?;

        Ok(documents::compute(run, &found, spec))
    }
}

// ref: https://www.sqlite.org/json1.html, bodies are the raw `_source` of each document.
// The comparator only reads, the schema is applied by test fixtures.
#[cfg(test)]
pub const SQL_SCHEMA: [&str; 2] = [
    "create table if not exists documents (
    id integer primary key,
    idx text not null,
    uuid text not null,
    body text not null
);",
    "create index if not exists documents_run on documents (idx, uuid);",
];
#[cfg(test)]
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
const CLOSE_ATTEMPTS: usize = 3;
