//! PostgreSQL implementation of the RBAC store.
//!
//! Each unit-of-work is one `sqlx` transaction:
//! - read units run `REPEATABLE READ, READ ONLY`, so a whole evaluation sees
//!   one consistent snapshot;
//! - write units take a transaction-scoped advisory lock first, which
//!   serializes mutations across every process sharing the database.
//!
//! Dropping a unit-of-work without committing rolls the transaction back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::{RbacStore, ReadTx, WriteTx};
use crate::config::DatabaseConfig;
use crate::error::{is_unique_violation, Result, WardenError};
use crate::rbac::{
    AuthContext, NewPolicy, NewRole, NewUser, Policy, PolicyId, Role, RoleId, Rule, User, UserId,
};
use crate::revocation::RevocationRecord;
use crate::security::SecurityConfig;

/// Advisory lock key held by every write transaction.
const WRITE_LOCK_KEY: i64 = 0x5741_5244_454e;

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    auth_context: Json<AuthContext>,
    system: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            username: row.username,
            auth_context: row.auth_context.0,
            system: row.system,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    rules: Json<Vec<Rule>>,
    system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId(row.id),
            name: row.name,
            rules: row.rules.0,
            system: row.system,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PolicyRow {
    id: i64,
    name: String,
    rule: Json<Rule>,
    system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PolicyRow> for Policy {
    fn from(row: PolicyRow) -> Self {
        Self {
            id: PolicyId(row.id),
            name: row.name,
            rule: row.rule.0,
            system: row.system,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id, username, auth_context, system, created_at";
const ROLE_COLUMNS: &str = "id, name, rules, system, created_at, updated_at";
const POLICY_COLUMNS: &str = "id, name, rule, system, created_at, updated_at";

/// Replace a generic unique violation with one naming the duplicate key.
fn conflict_on<'a>(kind: &'static str, key: &'a str) -> impl FnOnce(sqlx::Error) -> WardenError + 'a {
    move |error| {
        if is_unique_violation(&error) {
            WardenError::conflict(kind, key).with_source(error)
        } else {
            WardenError::from(error)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a connection pool and, if configured, apply the bundled migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        let store = Self { pool };
        if config.run_migrations {
            store.migrate().await?;
        }
        info!(
            max_connections = config.max_connections,
            "PostgreSQL RBAC store connected"
        );
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RbacStore for PgStore {
    async fn read(&self) -> Result<Box<dyn ReadTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgReadTx { tx }))
    }

    async fn write(&self) -> Result<Box<dyn WriteTx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(WRITE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgWriteTx { tx }))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════════

async fn get_user(conn: &mut PgConnection, id: UserId) -> Result<User> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM rbac_users WHERE id = $1"))
        .bind(id.0)
        .fetch_optional(conn)
        .await?
        .map(User::from)
        .ok_or_else(|| WardenError::not_found("user", id))
}

async fn get_role(conn: &mut PgConnection, id: RoleId) -> Result<Role> {
    sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM rbac_roles WHERE id = $1"))
        .bind(id.0)
        .fetch_optional(conn)
        .await?
        .map(Role::from)
        .ok_or_else(|| WardenError::not_found("role", id))
}

async fn get_policy(conn: &mut PgConnection, id: PolicyId) -> Result<Policy> {
    sqlx::query_as::<_, PolicyRow>(&format!(
        "SELECT {POLICY_COLUMNS} FROM rbac_policies WHERE id = $1"
    ))
    .bind(id.0)
    .fetch_optional(conn)
    .await?
    .map(Policy::from)
    .ok_or_else(|| WardenError::not_found("policy", id))
}

async fn get_user_by_name(conn: &mut PgConnection, username: &str) -> Result<User> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM rbac_users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(conn)
    .await?
    .map(User::from)
    .ok_or_else(|| WardenError::not_found("user", username))
}

async fn get_role_by_name(conn: &mut PgConnection, name: &str) -> Result<Role> {
    sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM rbac_roles WHERE name = $1"))
        .bind(name)
        .fetch_optional(conn)
        .await?
        .map(Role::from)
        .ok_or_else(|| WardenError::not_found("role", name))
}

async fn get_policy_by_name(conn: &mut PgConnection, name: &str) -> Result<Policy> {
    sqlx::query_as::<_, PolicyRow>(&format!(
        "SELECT {POLICY_COLUMNS} FROM rbac_policies WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(conn)
    .await?
    .map(Policy::from)
    .ok_or_else(|| WardenError::not_found("policy", name))
}

async fn list_users(conn: &mut PgConnection) -> Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM rbac_users ORDER BY id"
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(User::from).collect())
}

async fn list_roles(conn: &mut PgConnection) -> Result<Vec<Role>> {
    let rows = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT {ROLE_COLUMNS} FROM rbac_roles ORDER BY id"
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Role::from).collect())
}

async fn list_policies(conn: &mut PgConnection) -> Result<Vec<Policy>> {
    let rows = sqlx::query_as::<_, PolicyRow>(&format!(
        "SELECT {POLICY_COLUMNS} FROM rbac_policies ORDER BY id"
    ))
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Policy::from).collect())
}

async fn roles_of_user(conn: &mut PgConnection, user_id: UserId) -> Result<Vec<Role>> {
    get_user(&mut *conn, user_id).await?;
    let rows = sqlx::query_as::<_, RoleRow>(
        r#"
        SELECT r.id, r.name, r.rules, r.system, r.created_at, r.updated_at
        FROM rbac_roles r
        JOIN rbac_user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        ORDER BY ur.position
        "#,
    )
    .bind(user_id.0)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Role::from).collect())
}

async fn policies_of_role(conn: &mut PgConnection, role_id: RoleId) -> Result<Vec<Policy>> {
    get_role(&mut *conn, role_id).await?;
    let rows = sqlx::query_as::<_, PolicyRow>(
        r#"
        SELECT p.id, p.name, p.rule, p.system, p.created_at, p.updated_at
        FROM rbac_policies p
        JOIN rbac_role_policies rp ON rp.policy_id = p.id
        WHERE rp.role_id = $1
        ORDER BY rp.position
        "#,
    )
    .bind(role_id.0)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Policy::from).collect())
}

async fn users_of_role(conn: &mut PgConnection, role_id: RoleId) -> Result<Vec<UserId>> {
    get_role(&mut *conn, role_id).await?;
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM rbac_user_roles WHERE role_id = $1 ORDER BY position",
    )
    .bind(role_id.0)
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().map(UserId).collect())
}

async fn roles_of_policy(conn: &mut PgConnection, policy_id: PolicyId) -> Result<Vec<RoleId>> {
    get_policy(&mut *conn, policy_id).await?;
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT role_id FROM rbac_role_policies WHERE policy_id = $1 ORDER BY position",
    )
    .bind(policy_id.0)
    .fetch_all(conn)
    .await?;
    Ok(ids.into_iter().map(RoleId).collect())
}

async fn revocation(conn: &mut PgConnection, user_id: UserId) -> Result<Option<RevocationRecord>> {
    let not_before = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT not_before FROM rbac_revocations WHERE user_id = $1",
    )
    .bind(user_id.0)
    .fetch_optional(conn)
    .await?;
    Ok(not_before.map(|not_before| RevocationRecord {
        user_id,
        not_before,
    }))
}

async fn global_revocation(conn: &mut PgConnection) -> Result<Option<DateTime<Utc>>> {
    let not_before = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT not_before FROM rbac_global_revocation WHERE id = 1",
    )
    .fetch_optional(conn)
    .await?;
    Ok(not_before)
}

async fn security_config(conn: &mut PgConnection) -> Result<Option<SecurityConfig>> {
    let body = sqlx::query_scalar::<_, Json<SecurityConfig>>(
        "SELECT body FROM rbac_security_config WHERE id = 1",
    )
    .fetch_optional(conn)
    .await?;
    Ok(body.map(|json| json.0))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Units of work
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only transaction.
pub struct PgReadTx {
    tx: Transaction<'static, Postgres>,
}

/// Write transaction holding the store-wide advisory lock.
pub struct PgWriteTx {
    tx: Transaction<'static, Postgres>,
}

macro_rules! impl_read_tx {
    ($ty:ty) => {
        #[async_trait]
        impl ReadTx for $ty {
            async fn get_user(&mut self, id: UserId) -> Result<User> {
                get_user(&mut self.tx, id).await
            }

            async fn get_user_by_name(&mut self, username: &str) -> Result<User> {
                get_user_by_name(&mut self.tx, username).await
            }

            async fn list_users(&mut self) -> Result<Vec<User>> {
                list_users(&mut self.tx).await
            }

            async fn get_role(&mut self, id: RoleId) -> Result<Role> {
                get_role(&mut self.tx, id).await
            }

            async fn get_role_by_name(&mut self, name: &str) -> Result<Role> {
                get_role_by_name(&mut self.tx, name).await
            }

            async fn list_roles(&mut self) -> Result<Vec<Role>> {
                list_roles(&mut self.tx).await
            }

            async fn get_policy(&mut self, id: PolicyId) -> Result<Policy> {
                get_policy(&mut self.tx, id).await
            }

            async fn get_policy_by_name(&mut self, name: &str) -> Result<Policy> {
                get_policy_by_name(&mut self.tx, name).await
            }

            async fn list_policies(&mut self) -> Result<Vec<Policy>> {
                list_policies(&mut self.tx).await
            }

            async fn roles_of_user(&mut self, user_id: UserId) -> Result<Vec<Role>> {
                roles_of_user(&mut self.tx, user_id).await
            }

            async fn policies_of_role(&mut self, role_id: RoleId) -> Result<Vec<Policy>> {
                policies_of_role(&mut self.tx, role_id).await
            }

            async fn users_of_role(&mut self, role_id: RoleId) -> Result<Vec<UserId>> {
                users_of_role(&mut self.tx, role_id).await
            }

            async fn roles_of_policy(&mut self, policy_id: PolicyId) -> Result<Vec<RoleId>> {
                roles_of_policy(&mut self.tx, policy_id).await
            }

            async fn revocation(&mut self, user_id: UserId) -> Result<Option<RevocationRecord>> {
                revocation(&mut self.tx, user_id).await
            }

            async fn global_revocation(&mut self) -> Result<Option<DateTime<Utc>>> {
                global_revocation(&mut self.tx).await
            }

            async fn security_config(&mut self) -> Result<Option<SecurityConfig>> {
                security_config(&mut self.tx).await
            }
        }
    };
}

impl_read_tx!(PgReadTx);
impl_read_tx!(PgWriteTx);

#[async_trait]
impl WriteTx for PgWriteTx {
    async fn create_user(&mut self, user: NewUser) -> Result<User> {
        user.validate()?;
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO rbac_users (username, auth_context, system) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(Json(&user.auth_context))
        .bind(user.system)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(conflict_on("user", &user.username))?;
        Ok(row.into())
    }

    async fn create_role(&mut self, role: NewRole) -> Result<Role> {
        role.validate()?;
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "INSERT INTO rbac_roles (name, rules, system) VALUES ($1, $2, $3) \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(&role.name)
        .bind(Json(&role.rules))
        .bind(role.system)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(conflict_on("role", &role.name))?;
        Ok(row.into())
    }

    async fn create_policy(&mut self, policy: NewPolicy) -> Result<Policy> {
        policy.validate()?;
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "INSERT INTO rbac_policies (name, rule, system) VALUES ($1, $2, $3) \
             RETURNING {POLICY_COLUMNS}"
        ))
        .bind(&policy.name)
        .bind(Json(&policy.rule))
        .bind(policy.system)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(conflict_on("policy", &policy.name))?;
        Ok(row.into())
    }

    async fn update_user_auth_context(
        &mut self,
        id: UserId,
        auth_context: AuthContext,
    ) -> Result<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE rbac_users SET auth_context = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.0)
        .bind(Json(&auth_context))
        .fetch_optional(&mut *self.tx)
        .await?
        .map(User::from)
        .ok_or_else(|| WardenError::not_found("user", id))
    }

    async fn update_role_rules(&mut self, id: RoleId, rules: Vec<Rule>) -> Result<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "UPDATE rbac_roles SET rules = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id.0)
        .bind(Json(&rules))
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Role::from)
        .ok_or_else(|| WardenError::not_found("role", id))
    }

    async fn update_policy_rule(&mut self, id: PolicyId, rule: Rule) -> Result<Policy> {
        sqlx::query_as::<_, PolicyRow>(&format!(
            "UPDATE rbac_policies SET rule = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {POLICY_COLUMNS}"
        ))
        .bind(id.0)
        .bind(Json(&rule))
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Policy::from)
        .ok_or_else(|| WardenError::not_found("policy", id))
    }

    async fn delete_user(&mut self, id: UserId) -> Result<User> {
        sqlx::query("DELETE FROM rbac_user_roles WHERE user_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM rbac_revocations WHERE user_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query_as::<_, UserRow>(&format!(
            "DELETE FROM rbac_users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(User::from)
        .ok_or_else(|| WardenError::not_found("user", id))
    }

    async fn delete_role(&mut self, id: RoleId) -> Result<Role> {
        sqlx::query("DELETE FROM rbac_user_roles WHERE role_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM rbac_role_policies WHERE role_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query_as::<_, RoleRow>(&format!(
            "DELETE FROM rbac_roles WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Role::from)
        .ok_or_else(|| WardenError::not_found("role", id))
    }

    async fn delete_policy(&mut self, id: PolicyId) -> Result<Policy> {
        sqlx::query("DELETE FROM rbac_role_policies WHERE policy_id = $1")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query_as::<_, PolicyRow>(&format!(
            "DELETE FROM rbac_policies WHERE id = $1 RETURNING {POLICY_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Policy::from)
        .ok_or_else(|| WardenError::not_found("policy", id))
    }

    async fn link_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<bool> {
        get_user(&mut self.tx, user_id).await?;
        get_role(&mut self.tx, role_id).await?;
        let result = sqlx::query(
            "INSERT INTO rbac_user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id.0)
        .bind(role_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlink_user_role(&mut self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let result = sqlx::query("DELETE FROM rbac_user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id.0)
            .bind(role_id.0)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::not_found(
                "user_role",
                format!("{}:{}", user_id, role_id),
            ));
        }
        Ok(())
    }

    async fn link_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<bool> {
        get_role(&mut self.tx, role_id).await?;
        get_policy(&mut self.tx, policy_id).await?;
        let result = sqlx::query(
            "INSERT INTO rbac_role_policies (role_id, policy_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(role_id.0)
        .bind(policy_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlink_role_policy(&mut self, role_id: RoleId, policy_id: PolicyId) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM rbac_role_policies WHERE role_id = $1 AND policy_id = $2")
                .bind(role_id.0)
                .bind(policy_id.0)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(WardenError::not_found(
                "role_policy",
                format!("{}:{}", role_id, policy_id),
            ));
        }
        Ok(())
    }

    async fn raise_revocation(
        &mut self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<RevocationRecord> {
        get_user(&mut self.tx, user_id).await?;
        let not_before = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO rbac_revocations (user_id, not_before)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET not_before = GREATEST(rbac_revocations.not_before, EXCLUDED.not_before)
            RETURNING not_before
            "#,
        )
        .bind(user_id.0)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(RevocationRecord {
            user_id,
            not_before,
        })
    }

    async fn raise_global_revocation(&mut self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let not_before = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            INSERT INTO rbac_global_revocation (id, not_before)
            VALUES (1, $1)
            ON CONFLICT (id)
            DO UPDATE SET not_before = GREATEST(rbac_global_revocation.not_before, EXCLUDED.not_before)
            RETURNING not_before
            "#,
        )
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(not_before)
    }

    async fn prune_revocations(&mut self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rbac_revocations WHERE not_before < $1")
            .bind(before)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn save_security_config(&mut self, config: &SecurityConfig) -> Result<()> {
        let version = i64::try_from(config.version)
            .map_err(|_| WardenError::internal("Security configuration version overflow"))?;
        sqlx::query(
            r#"
            INSERT INTO rbac_security_config (id, version, body, updated_at)
            VALUES (1, $1, $2, NOW())
            ON CONFLICT (id)
            DO UPDATE SET version = EXCLUDED.version, body = EXCLUDED.body, updated_at = NOW()
            "#,
        )
        .bind(version)
        .bind(Json(config))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        debug!("PostgreSQL transaction rolled back");
        Ok(())
    }
}
