//! DuckDB storage for user profiles and prediction records.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use arrow::record_batch::RecordBatch;
use chargewise_core::{
    ContactDetails, PredictionRecord, PredictionRecorder, Profile, RecordReceipt, Region, Role,
    Sex, Smoker, UserDirectory, UserId,
};
use duckdb::{Connection, Row, params};
use tracing::{debug, info};

use crate::StoreError;

const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS users_id_seq START 1;
CREATE TABLE IF NOT EXISTS users (
    id         BIGINT PRIMARY KEY DEFAULT nextval('users_id_seq'),
    email      VARCHAR NOT NULL UNIQUE,
    role       VARCHAR NOT NULL DEFAULT 'Client',
    first_name VARCHAR,
    last_name  VARCHAR,
    age        BIGINT,
    gender     VARCHAR,
    weight     DOUBLE,
    height     DOUBLE,
    smoker     VARCHAR,
    children   BIGINT,
    region     VARCHAR
);

CREATE SEQUENCE IF NOT EXISTS client_infos_id_seq START 1;
CREATE TABLE IF NOT EXISTS client_infos (
    id         BIGINT PRIMARY KEY DEFAULT nextval('client_infos_id_seq'),
    first_name VARCHAR NOT NULL,
    last_name  VARCHAR NOT NULL,
    email      VARCHAR NOT NULL,
    user_id    BIGINT,
    UNIQUE (first_name, last_name, email)
);

CREATE SEQUENCE IF NOT EXISTS predictions_id_seq START 1;
CREATE TABLE IF NOT EXISTS predictions (
    id          BIGINT PRIMARY KEY DEFAULT nextval('predictions_id_seq'),
    created_at  TIMESTAMP NOT NULL DEFAULT current_timestamp,
    client_id   BIGINT NOT NULL REFERENCES client_infos (id),
    created_by  BIGINT,
    prediction  DOUBLE NOT NULL CHECK (prediction < 1000000),
    range_lower DOUBLE CHECK (range_lower < 1000000),
    range_upper DOUBLE CHECK (range_upper < 1000000),
    age         BIGINT NOT NULL,
    weight      DOUBLE NOT NULL,
    height      DOUBLE NOT NULL,
    children    BIGINT NOT NULL,
    gender      VARCHAR NOT NULL,
    smoker      VARCHAR NOT NULL,
    region      VARCHAR NOT NULL
);
";

const USER_COLUMNS: &str =
    "id, email, role, first_name, last_name, age, gender, weight, height, smoker, children, region";

/// A user account to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub smoker: Option<Smoker>,
    pub children: Option<u32>,
    pub region: Option<Region>,
}

impl NewUser {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
            first_name: None,
            last_name: None,
            age: None,
            sex: None,
            weight_kg: None,
            height_m: None,
            smoker: None,
            children: None,
            region: None,
        }
    }
}

/// DuckDB store holding the `users` directory and the
/// `client_infos` / `predictions` record tables.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// The connection sits behind a mutex so one store can serve concurrent
/// requests; each call holds it for a single statement or transaction.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    ///
    /// Tables are created on first open and reused afterwards.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Users ──

    /// Create a user account, returning its id.
    pub fn insert_user(&self, user: &NewUser) -> Result<UserId, StoreError> {
        let email = user.email.trim().to_ascii_lowercase();
        let conn = self.lock();

        let mut stmt = conn.prepare("SELECT id FROM users WHERE email = ?")?;
        let existing: Vec<i64> = stmt
            .query_map(params![email], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        if !existing.is_empty() {
            return Err(StoreError::DuplicateUser(email));
        }

        let id: i64 = conn.query_row(
            "INSERT INTO users (email, role, first_name, last_name, age, gender, weight, height, smoker, children, region)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![
                email,
                user.role.as_str(),
                user.first_name,
                user.last_name,
                user.age.map(i64::from),
                user.sex.map(|v| v.as_str()),
                user.weight_kg,
                user.height_m,
                user.smoker.map(|v| v.as_str()),
                user.children.map(i64::from),
                user.region.map(|v| v.as_str()),
            ],
            |row| row.get(0),
        )?;
        info!(id, role = %user.role, "created user");
        Ok(id)
    }

    fn query_profiles(&self, sql: &str, id: Option<UserId>) -> Result<Vec<Profile>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows: Vec<UserRow> = match id {
            Some(id) => stmt.query_map([id], UserRow::from_row)?.collect::<Result<_, _>>()?,
            None => stmt.query_map([], UserRow::from_row)?.collect::<Result<_, _>>()?,
        };
        rows.into_iter().map(UserRow::into_profile).collect()
    }

    // ── Counts ──

    /// Number of rows in `client_infos`.
    pub fn client_count(&self) -> Result<usize, StoreError> {
        self.count_table("client_infos")
    }

    /// Number of rows in `predictions`.
    pub fn prediction_count(&self) -> Result<usize, StoreError> {
        self.count_table("predictions")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    // ── History ──

    /// All predictions recorded for a contact email, newest first.
    pub fn predictions_for_email(&self, email: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let email = email.trim().to_ascii_lowercase();
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.created_at, c.first_name, c.last_name, c.email,
                    p.prediction, p.range_lower, p.range_upper,
                    p.age, p.gender, p.smoker, p.weight, p.height, p.children, p.region,
                    p.created_by
             FROM predictions p
             JOIN client_infos c ON c.id = p.client_id
             WHERE c.email = ?
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let batches: Vec<RecordBatch> = stmt.query_arrow(params![email])?.collect();
        Ok(batches)
    }
}

impl UserDirectory for DuckStore {
    type Error = StoreError;

    fn profile(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        Ok(self.query_profiles(&sql, Some(id))?.into_iter().next())
    }

    fn clients(&self) -> Result<Vec<Profile>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = 'Client' ORDER BY id");
        self.query_profiles(&sql, None)
    }
}

impl PredictionRecorder for DuckStore {
    type Error = StoreError;

    /// Reuse or create the contact, then insert the prediction, in one
    /// transaction. Any failure rolls both back.
    fn record(&self, record: &PredictionRecord<'_>) -> Result<RecordReceipt, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let (client_id, client_created) = upsert_client(&tx, record.contact, record.subject_user)?;

        let input = record.input;
        let result = record.result;
        let prediction_id: i64 = tx.query_row(
            "INSERT INTO predictions (client_id, created_by, prediction, range_lower, range_upper,
                                      age, weight, height, children, gender, smoker, region)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
            params![
                client_id,
                record.created_by,
                result.point_estimate,
                result.lower_bound,
                result.upper_bound,
                i64::from(input.age),
                input.weight_kg,
                input.height_m,
                i64::from(input.children),
                input.sex.as_str(),
                input.smoker.as_str(),
                input.region.as_str(),
            ],
            |row| row.get(0),
        )?;

        tx.commit()?;
        info!(client_id, prediction_id, client_created, "recorded prediction");
        Ok(RecordReceipt {
            client_id,
            prediction_id,
            client_created,
        })
    }
}

/// Find the contact by natural key or insert it. Returns `(id, created)`.
fn upsert_client(
    conn: &Connection,
    contact: &ContactDetails,
    user_id: Option<UserId>,
) -> Result<(i64, bool), StoreError> {
    let mut stmt = conn
        .prepare("SELECT id FROM client_infos WHERE first_name = ? AND last_name = ? AND email = ?")?;
    let existing: Vec<i64> = stmt
        .query_map(
            params![contact.first_name, contact.last_name, contact.email],
            |row| row.get(0),
        )?
        .collect::<Result<_, _>>()?;
    if let Some(&id) = existing.first() {
        debug!(client_id = id, "reusing contact record");
        return Ok((id, false));
    }

    let id: i64 = conn.query_row(
        "INSERT INTO client_infos (first_name, last_name, email, user_id)
         VALUES (?, ?, ?, ?)
         RETURNING id",
        params![contact.first_name, contact.last_name, contact.email, user_id],
        |row| row.get(0),
    )?;
    Ok((id, true))
}

/// Raw `users` row; enum columns are parsed in [`UserRow::into_profile`].
struct UserRow {
    id: i64,
    email: String,
    role: String,
    first_name: Option<String>,
    last_name: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    weight: Option<f64>,
    height: Option<f64>,
    smoker: Option<String>,
    children: Option<i64>,
    region: Option<String>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            role: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            age: row.get(5)?,
            gender: row.get(6)?,
            weight: row.get(7)?,
            height: row.get(8)?,
            smoker: row.get(9)?,
            children: row.get(10)?,
            region: row.get(11)?,
        })
    }

    fn into_profile(self) -> Result<Profile, StoreError> {
        let invalid = |column: &'static str| {
            move |e: chargewise_core::ParseChoiceError| StoreError::InvalidValue {
                column,
                reason: e.to_string(),
            }
        };
        let count = |column: &'static str, v: Option<i64>| {
            v.map(u32::try_from)
                .transpose()
                .map_err(|e| StoreError::InvalidValue {
                    column,
                    reason: e.to_string(),
                })
        };

        Ok(Profile {
            id: self.id,
            role: self.role.parse().map_err(invalid("role"))?,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            age: count("age", self.age)?,
            sex: self
                .gender
                .map(|s| s.parse::<Sex>())
                .transpose()
                .map_err(invalid("gender"))?,
            weight_kg: self.weight,
            height_m: self.height,
            children: count("children", self.children)?,
            region: self
                .region
                .map(|s| s.parse::<Region>())
                .transpose()
                .map_err(invalid("region"))?,
            smoker: self
                .smoker
                .map(|s| s.parse::<Smoker>())
                .transpose()
                .map_err(invalid("smoker"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargewise_core::{IdentityResolver, PredictionInput, PredictionResult, Subject, Viewer};

    fn marie() -> NewUser {
        NewUser {
            first_name: Some("Marie".into()),
            last_name: Some("Dupont".into()),
            age: Some(19),
            sex: Some(Sex::Female),
            weight_kg: Some(65.8),
            height_m: Some(1.75),
            smoker: Some(Smoker::Yes),
            children: Some(0),
            region: Some(Region::Southwest),
            ..NewUser::new("marie.dupont@gmail.com", Role::Client)
        }
    }

    fn input() -> PredictionInput {
        PredictionInput {
            age: 30,
            sex: Sex::Female,
            smoker: Smoker::No,
            weight_kg: 80.0,
            height_m: 1.75,
            children: 1,
            region: Region::Southwest,
        }
    }

    fn contact() -> ContactDetails {
        ContactDetails::new("Marie", "Dupont", "marie.dupont@gmail.com")
    }

    fn record<'a>(
        contact: &'a ContactDetails,
        input: &'a PredictionInput,
        result: &'a PredictionResult,
    ) -> PredictionRecord<'a> {
        PredictionRecord {
            contact,
            subject_user: None,
            created_by: None,
            input,
            result,
        }
    }

    #[test]
    fn open_in_memory_creates_tables() {
        let store = DuckStore::open().unwrap();
        assert_eq!(store.client_count().unwrap(), 0);
        assert_eq!(store.prediction_count().unwrap(), 0);
    }

    #[test]
    fn user_round_trips_through_directory() {
        let store = DuckStore::open().unwrap();
        let id = store.insert_user(&marie()).unwrap();

        let profile = store.profile(id).unwrap().unwrap();
        assert_eq!(profile.email, "marie.dupont@gmail.com");
        assert_eq!(profile.role, Role::Client);
        assert_eq!(profile.age, Some(19));
        assert_eq!(profile.children, Some(0));
        assert_eq!(profile.smoker, Some(Smoker::Yes));
        assert_eq!(profile.region, Some(Region::Southwest));
        assert_eq!(profile.weight_kg, Some(65.8));
    }

    #[test]
    fn unset_attributes_stay_unset() {
        let store = DuckStore::open().unwrap();
        let id = store
            .insert_user(&NewUser::new("jbernard@hotmail.fr", Role::Client))
            .unwrap();
        let profile = store.profile(id).unwrap().unwrap();
        assert_eq!(profile.children, None);
        assert_eq!(profile.age, None);
        assert_eq!(profile.first_name, None);
    }

    #[test]
    fn unknown_user_is_none() {
        let store = DuckStore::open().unwrap();
        assert!(store.profile(42).unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = DuckStore::open().unwrap();
        store.insert_user(&marie()).unwrap();
        let again = NewUser::new("Marie.Dupont@gmail.com", Role::Advisor);
        assert!(matches!(
            store.insert_user(&again),
            Err(StoreError::DuplicateUser(_))
        ));
    }

    #[test]
    fn clients_excludes_advisors() {
        let store = DuckStore::open().unwrap();
        let a = store.insert_user(&marie()).unwrap();
        store
            .insert_user(&NewUser::new("advisor@test.fr", Role::Advisor))
            .unwrap();
        let b = store
            .insert_user(&NewUser::new("jbernard@hotmail.fr", Role::Client))
            .unwrap();

        let ids: Vec<UserId> = store.clients().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, [a, b]);
    }

    #[test]
    fn resolver_over_store() {
        let store = DuckStore::open().unwrap();
        let client = store.insert_user(&marie()).unwrap();
        let advisor = store
            .insert_user(&NewUser::new("advisor@test.fr", Role::Advisor))
            .unwrap();

        let resolver = IdentityResolver::new(&store);
        let r = resolver.resolve(&Viewer::Advisor(advisor), Some(client)).unwrap();
        assert!(matches!(r.subject, Some(Subject::Selected(_))));
        assert_eq!(r.selectable.len(), 1);
        assert_eq!(r.prefill.children, Some(0));

        let r = resolver.resolve(&Viewer::Advisor(advisor), Some(999)).unwrap();
        assert!(r.subject.is_none());
    }

    #[test]
    fn repeated_contact_reuses_client_row() {
        let store = DuckStore::open().unwrap();
        let contact = contact();
        let input = input();
        let first = PredictionResult::with_error_estimate(5000.0, 1000.0);
        let second = PredictionResult::point_only(5100.0);

        let a = store.record(&record(&contact, &input, &first)).unwrap();
        let b = store.record(&record(&contact, &input, &second)).unwrap();

        assert!(a.client_created);
        assert!(!b.client_created);
        assert_eq!(a.client_id, b.client_id);
        assert_ne!(a.prediction_id, b.prediction_id);
        assert_eq!(store.client_count().unwrap(), 1);
        assert_eq!(store.prediction_count().unwrap(), 2);
    }

    #[test]
    fn identical_requests_are_each_kept() {
        let store = DuckStore::open().unwrap();
        let contact = contact();
        let input = input();
        let result = PredictionResult::point_only(5000.0);

        store.record(&record(&contact, &input, &result)).unwrap();
        store.record(&record(&contact, &input, &result)).unwrap();
        assert_eq!(store.client_count().unwrap(), 1);
        assert_eq!(store.prediction_count().unwrap(), 2);
    }

    #[test]
    fn distinct_contacts_get_distinct_rows() {
        let store = DuckStore::open().unwrap();
        let input = input();
        let result = PredictionResult::point_only(5000.0);
        let marie = contact();
        let jean = ContactDetails::new("Jean", "Bernard", "jbernard@hotmail.fr");

        let a = store.record(&record(&marie, &input, &result)).unwrap();
        let b = store.record(&record(&jean, &input, &result)).unwrap();
        assert_ne!(a.client_id, b.client_id);
        assert_eq!(store.client_count().unwrap(), 2);
    }

    #[test]
    fn failed_prediction_insert_rolls_back_contact() {
        let store = DuckStore::open().unwrap();
        let contact = contact();
        let input = input();
        let too_large = PredictionResult::point_only(5_000_000.0);

        assert!(store.record(&record(&contact, &input, &too_large)).is_err());
        assert_eq!(store.client_count().unwrap(), 0);
        assert_eq!(store.prediction_count().unwrap(), 0);

        // The store stays usable after the rollback.
        let ok = PredictionResult::point_only(5000.0);
        let receipt = store.record(&record(&contact, &input, &ok)).unwrap();
        assert!(receipt.client_created);
        assert_eq!(store.client_count().unwrap(), 1);
    }

    #[test]
    fn history_lists_predictions_for_email() {
        let store = DuckStore::open().unwrap();
        let contact = contact();
        let input = input();
        let result = PredictionResult::with_error_estimate(5000.0, 1000.0);
        store.record(&record(&contact, &input, &result)).unwrap();
        store.record(&record(&contact, &input, &result)).unwrap();

        let batches = store.predictions_for_email("Marie.Dupont@gmail.com").unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert!(batches[0].schema().field_with_name("prediction").is_ok());

        let none = store.predictions_for_email("nobody@example.com").unwrap();
        assert_eq!(none.iter().map(|b| b.num_rows()).sum::<usize>(), 0);
    }

    // ── Persistent storage ──

    #[test]
    fn persistent_records_survive_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("chargewise.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        let id = store.insert_user(&marie()).unwrap();
        let contact = contact();
        let input = input();
        let result = PredictionResult::point_only(5000.0);
        store.record(&record(&contact, &input, &result)).unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(store.profile(id).unwrap().is_some());
        assert_eq!(store.prediction_count().unwrap(), 1);
        // A new user after reopen does not collide with the first id.
        let next = store
            .insert_user(&NewUser::new("advisor@test.fr", Role::Advisor))
            .unwrap();
        assert_ne!(next, id);
    }
}
