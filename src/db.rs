use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, TallyError};
use crate::fmt::{from_cents, to_cents};
use crate::models::Account;

pub const DB_FILE: &str = "tally.db";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    account_type TEXT NOT NULL,
    institution TEXT,
    account_number TEXT,
    balance_cents INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    account_id INTEGER,
    transaction_date TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
    direction TEXT NOT NULL CHECK (direction IN ('in', 'out')),
    category TEXT NOT NULL,
    merchant TEXT,
    note TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (account_id) REFERENCES accounts(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, transaction_date);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    // Import workers share the file; writers wait for the lock instead of failing.
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Whether `init_db` has run against this connection's database.
pub fn schema_ready(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'accounts', 'transactions')",
        [],
        |r| r.get(0),
    )?;
    Ok(count == 3)
}

/// Location of the ledger; hands out one connection per caller.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DB_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn connect(&self) -> Result<Connection> {
        get_connection(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub fn ensure_user(conn: &Connection, username: &str) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO users (username) VALUES (?1)",
        [username],
    )?;
    let id = conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        [username],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn find_user(conn: &Connection, username: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM users WHERE username = ?1", [username], |r| r.get(0))
        .optional()?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub struct NewAccount<'a> {
    pub name: &'a str,
    pub account_type: &'a str,
    pub institution: Option<&'a str>,
    pub account_number: Option<&'a str>,
    pub balance: rust_decimal::Decimal,
}

pub fn add_account(conn: &Connection, user_id: i64, account: &NewAccount<'_>) -> Result<i64> {
    let cents = to_cents(account.balance)
        .ok_or_else(|| TallyError::invalid_field("balance", "out of range"))?;
    conn.execute(
        "INSERT INTO accounts (user_id, name, account_type, institution, account_number, balance_cents) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            user_id,
            account.name,
            account.account_type,
            account.institution,
            account.account_number,
            cents
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type: row.get(3)?,
        institution: row.get(4)?,
        account_number: row.get(5)?,
        balance: from_cents(row.get(6)?),
    })
}

const ACCOUNT_COLUMNS: &str =
    "id, user_id, name, account_type, institution, account_number, balance_cents";

pub fn list_accounts(conn: &Connection, user_id: i64) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND is_active = 1 ORDER BY id"
    ))?;
    let accounts = stmt
        .query_map([user_id], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(accounts)
}

pub fn get_account(conn: &Connection, account_id: i64) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            [account_id],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

pub fn transaction_count(conn: &Connection, user_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT count(*) FROM transactions WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    pub(crate) fn checking(balance: &str) -> NewAccount<'static> {
        NewAccount {
            name: "Everyday Checking",
            account_type: "checking",
            institution: Some("First Example Bank"),
            account_number: Some("****4821"),
            balance: Decimal::from_str(balance).unwrap(),
        }
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["users", "accounts", "transactions"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
        assert!(schema_ready(&conn).unwrap());
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_schema_not_ready_on_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("empty.db")).unwrap();
        assert!(!schema_ready(&conn).unwrap());
    }

    #[test]
    fn test_ensure_user_is_stable() {
        let (_dir, conn) = test_db();
        let a = ensure_user(&conn, "me").unwrap();
        let b = ensure_user(&conn, "me").unwrap();
        let c = ensure_user(&conn, "someone-else").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(find_user(&conn, "me").unwrap(), Some(a));
        assert_eq!(find_user(&conn, "nobody").unwrap(), None);
    }

    #[test]
    fn test_account_roundtrip_keeps_cents() {
        let (_dir, conn) = test_db();
        let user = ensure_user(&conn, "me").unwrap();
        let id = add_account(&conn, user, &checking("1234.56")).unwrap();
        let account = get_account(&conn, id).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from_str("1234.56").unwrap());
        assert_eq!(account.user_id, user);
        assert_eq!(list_accounts(&conn, user).unwrap().len(), 1);
    }

    #[test]
    fn test_amount_must_be_positive() {
        let (_dir, conn) = test_db();
        let user = ensure_user(&conn, "me").unwrap();
        let result = conn.execute(
            "INSERT INTO transactions (user_id, transaction_date, amount_cents, direction, category) VALUES (?1, '2025-01-01', 0, 'out', 'Other')",
            [user],
        );
        assert!(result.is_err());
    }
}
