//! SQLite persistence for ingested companies, products and run records.
//!
//! Every operation opens its own connection and closes it before returning, so
//! each upsert commits independently of the rest of a run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use barnivore_core::{Company, Product};
use chrono::{DateTime, Local};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use thiserror::Error;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS company (
    id INTEGER NOT NULL PRIMARY KEY,
    address VARCHAR,
    checkedby VARCHAR,
    city VARCHAR,
    companyemail VARCHAR,
    companyname VARCHAR,
    country VARCHAR,
    createdon VARCHAR,
    doubledby VARCHAR,
    editor VARCHAR,
    email VARCHAR,
    fax VARCHAR,
    notes VARCHAR,
    phone VARCHAR,
    postal VARCHAR,
    redyellowgreen VARCHAR,
    region VARCHAR,
    state VARCHAR,
    status VARCHAR,
    updatedon VARCHAR,
    url VARCHAR
);

CREATE TABLE IF NOT EXISTS product (
    id BIGINT NOT NULL PRIMARY KEY,
    boozetype VARCHAR,
    companyid INTEGER,
    productname VARCHAR,
    redyellowgreen VARCHAR,
    FOREIGN KEY (companyid) REFERENCES company (id)
);

CREATE TABLE IF NOT EXISTS stats (
    id BIGINT NOT NULL PRIMARY KEY,
    addressstring VARCHAR,
    datestring VARCHAR
)
"#;

const UPSERT_COMPANY: &str = r#"
INSERT OR REPLACE INTO company (
    id, address, checkedby, city, companyemail, companyname,
    country, createdon, doubledby, editor, email, fax, notes,
    phone, postal, redyellowgreen, region, state, status,
    updatedon, url
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPSERT_PRODUCT: &str = r#"
INSERT OR REPLACE INTO product (
    id, boozetype, companyid, productname, redyellowgreen
) VALUES (?, ?, ?, ?, ?)
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening sqlite store {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub companies: i64,
    pub products: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub id: i64,
    pub company_id: Option<i64>,
    pub booze_type: Option<String>,
    pub product_name: Option<String>,
    pub red_yellow_green: Option<String>,
}

/// One row of the `stats` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub id: i64,
    pub note: Option<String>,
    pub recorded_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl Store {
    /// Point the store at a database file. Nothing is opened until the first operation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        // Product rows may reference companies that are not written yet, and a
        // company REPLACE must not trip over its existing products.
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(false)
            .busy_timeout(Duration::from_secs(5));
        Self { path, options }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|source| StoreError::Connect {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Create the company, product and stats tables when absent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        info!(path = %self.path.display(), "initializing database");
        let mut conn = self.connect().await?;
        for stmt in SCHEMA.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            sqlx::query(stmt).execute(&mut conn).await?;
        }
        conn.close().await?;
        Ok(())
    }

    /// Insert the company, replacing any existing row with the same id wholesale.
    pub async fn upsert_company(&self, company: &Company) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        sqlx::query(UPSERT_COMPANY)
            .bind(company.id)
            .bind(company.address.as_deref())
            .bind(company.checked_by.as_deref())
            .bind(company.city.as_deref())
            .bind(company.company_email.as_deref())
            .bind(company.company_name.as_deref())
            .bind(company.country.as_deref())
            .bind(company.created_on.as_deref())
            .bind(company.doubled_by.as_deref())
            .bind(company.editor.as_deref())
            .bind(company.email.as_deref())
            .bind(company.fax.as_deref())
            .bind(company.notes.as_deref())
            .bind(company.phone.as_deref())
            .bind(company.postal.as_deref())
            .bind(company.red_yellow_green.as_deref())
            .bind(company.region.as_deref())
            .bind(company.state.as_deref())
            .bind(company.status.as_deref())
            .bind(company.updated_on.as_deref())
            .bind(company.url.as_deref())
            .execute(&mut conn)
            .await?;
        conn.close().await?;
        Ok(())
    }

    /// Write all products of one company in a single transaction. No-op on empty input.
    pub async fn upsert_products(
        &self,
        company_id: i64,
        products: &[Product],
    ) -> Result<(), StoreError> {
        if products.is_empty() {
            return Ok(());
        }

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        for product in products {
            sqlx::query(UPSERT_PRODUCT)
                .bind(product.id)
                .bind(product.booze_type.as_deref())
                .bind(company_id)
                .bind(product.product_name.as_deref())
                .bind(product.red_yellow_green.as_deref())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        conn.close().await?;
        debug!(company_id, products = products.len(), "products written");
        Ok(())
    }

    pub async fn record_run(&self, note: Option<&str>) -> Result<RunRow, StoreError> {
        self.record_run_at(note, Local::now()).await
    }

    /// Append a run record keyed by the unix second of `at`. A second run within
    /// the same second collides on the primary key and fails.
    pub async fn record_run_at(
        &self,
        note: Option<&str>,
        at: DateTime<Local>,
    ) -> Result<RunRow, StoreError> {
        let row = RunRow {
            id: at.timestamp(),
            note: Some(match note {
                Some(note) => note.to_string(),
                None => format!("Data scraped at {}", at.to_rfc3339()),
            }),
            recorded_at: Some(at.format("%Y-%m-%d %H:%M:%S").to_string()),
        };

        let mut conn = self.connect().await?;
        sqlx::query("INSERT INTO stats (id, addressstring, datestring) VALUES (?, ?, ?)")
            .bind(row.id)
            .bind(row.note.as_deref())
            .bind(row.recorded_at.as_deref())
            .execute(&mut conn)
            .await?;
        conn.close().await?;
        Ok(row)
    }

    pub async fn read_counts(&self) -> Result<StoreCounts, StoreError> {
        let mut conn = self.connect().await?;
        let companies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM company")
            .fetch_one(&mut conn)
            .await?;
        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        Ok(StoreCounts {
            companies,
            products,
        })
    }

    /// Load a stored company. The returned record never carries products; use
    /// [`Store::products_for_company`] for those.
    pub async fn company(&self, id: i64) -> Result<Option<Company>, StoreError> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT * FROM company WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut conn)
            .await?;
        conn.close().await?;
        row.map(|row| company_from_row(&row)).transpose()
    }

    pub async fn products_for_company(
        &self,
        company_id: i64,
    ) -> Result<Vec<ProductRow>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, boozetype, companyid, productname, redyellowgreen
              FROM product
             WHERE companyid = ?
             ORDER BY id
            "#,
        )
        .bind(company_id)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ProductRow {
                id: row.try_get("id")?,
                company_id: row.try_get("companyid")?,
                booze_type: row.try_get("boozetype")?,
                product_name: row.try_get("productname")?,
                red_yellow_green: row.try_get("redyellowgreen")?,
            });
        }
        Ok(out)
    }

    pub async fn runs(&self) -> Result<Vec<RunRow>, StoreError> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT id, addressstring, datestring FROM stats ORDER BY id")
            .fetch_all(&mut conn)
            .await?;
        conn.close().await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(RunRow {
                id: row.try_get("id")?,
                note: row.try_get("addressstring")?,
                recorded_at: row.try_get("datestring")?,
            });
        }
        Ok(out)
    }
}

fn company_from_row(row: &SqliteRow) -> Result<Company, StoreError> {
    Ok(Company {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        checked_by: row.try_get("checkedby")?,
        city: row.try_get("city")?,
        company_email: row.try_get("companyemail")?,
        company_name: row.try_get("companyname")?,
        country: row.try_get("country")?,
        created_on: row.try_get("createdon")?,
        doubled_by: row.try_get("doubledby")?,
        editor: row.try_get("editor")?,
        email: row.try_get("email")?,
        fax: row.try_get("fax")?,
        notes: row.try_get("notes")?,
        phone: row.try_get("phone")?,
        postal: row.try_get("postal")?,
        red_yellow_green: row.try_get("redyellowgreen")?,
        region: row.try_get("region")?,
        state: row.try_get("state")?,
        status: row.try_get("status")?,
        updated_on: row.try_get("updatedon")?,
        url: row.try_get("url")?,
        products: Vec::new(),
        skipped_products: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn company(id: i64, name: &str) -> Company {
        Company {
            id,
            company_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn product(id: i64, name: &str) -> Product {
        Product {
            id,
            booze_type: Some("Beer".into()),
            product_name: Some(name.to_string()),
            red_yellow_green: Some("Green".into()),
        }
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("catalog.db"));
        store.ensure_schema().await.expect("first schema");
        store.ensure_schema().await.expect("second schema");
        assert_eq!(store.read_counts().await.expect("counts"), StoreCounts::default());
    }

    #[tokio::test]
    async fn upserting_twice_keeps_one_row_with_latest_values() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("catalog.db"));
        store.ensure_schema().await.expect("schema");

        let mut first = company(1, "Old Name");
        first.city = Some("Portland".into());
        store.upsert_company(&first).await.expect("first upsert");

        let second = company(1, "New Name");
        store.upsert_company(&second).await.expect("second upsert");

        let counts = store.read_counts().await.expect("counts");
        assert_eq!(counts.companies, 1);

        let stored = store.company(1).await.expect("load").expect("row");
        assert_eq!(stored.company_name.as_deref(), Some("New Name"));
        // full-row replace, not a column merge
        assert_eq!(stored.city, None);
    }

    #[tokio::test]
    async fn products_are_replaced_by_id_and_owned_by_the_given_company() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("catalog.db"));
        store.ensure_schema().await.expect("schema");

        store
            .upsert_products(5, &[product(50, "Lager"), product(51, "Stout")])
            .await
            .expect("products");
        store
            .upsert_products(5, &[product(51, "Imperial Stout")])
            .await
            .expect("products again");
        store.upsert_products(5, &[]).await.expect("empty is a no-op");

        // no parent company row yet; the reference is not enforced
        assert_eq!(store.company(5).await.expect("load"), None);

        let rows = store.products_for_company(5).await.expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].product_name.as_deref(), Some("Imperial Stout"));
        assert!(rows.iter().all(|r| r.company_id == Some(5)));

        store.upsert_company(&company(5, "Brewery")).await.expect("parent");
        store.upsert_company(&company(5, "Brewery Renamed")).await.expect("replace parent");
        assert_eq!(store.read_counts().await.expect("counts").products, 2);
    }

    #[tokio::test]
    async fn run_records_append_and_collide_within_one_second() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("catalog.db"));
        store.ensure_schema().await.expect("schema");

        let t1 = Local.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).single().expect("ts");
        let t2 = Local.with_ymd_and_hms(2026, 10, 18, 9, 0, 1).single().expect("ts");

        let first = store
            .record_run_at(Some("Scraped 2 companies, 0 failed"), t1)
            .await
            .expect("first run");
        store.record_run_at(None, t2).await.expect("second run");
        assert!(store.record_run_at(None, t2).await.is_err());

        let runs = store.runs().await.expect("runs");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], first);
        assert_eq!(runs[0].recorded_at.as_deref(), Some("2026-10-18 09:00:00"));
        assert!(runs[1]
            .note
            .as_deref()
            .is_some_and(|n| n.starts_with("Data scraped at 2026-10-18T09:00:01")));
    }

    #[tokio::test]
    async fn unreachable_path_reports_connect_error() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("missing-dir").join("catalog.db"));
        let err = store.ensure_schema().await.expect_err("no parent directory");
        assert!(matches!(err, StoreError::Connect { .. }));
    }
}
