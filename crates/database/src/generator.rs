//! Credential generation through a pooled session

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::connection::{ConnectionHandle, GeneratedCredential, UsernameConfig};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::role::Statements;

/// Ask the target behind `handle` to create a principal.
///
/// Runs exactly once: `create_user` is not idempotent, so retries are left to
/// the caller. Failures are classified by the session itself; anything it does
/// not recognise, as well as cancellation and deadline expiry, is treated as
/// not fatal to the connection.
pub async fn generate(
    handle: &ConnectionHandle,
    statements: &Statements,
    username: &UsernameConfig,
    expiration: DateTime<Utc>,
    ctx: &RequestContext,
) -> Result<GeneratedCredential> {
    let database = handle.database();
    let outcome = ctx
        .bounded(
            "create user",
            None,
            database.create_user(statements, username, expiration),
        )
        .await;

    let (source, connection_fatal) = match outcome {
        Ok(Ok(credential)) => return Ok(credential),
        Ok(Err(source)) => {
            let fatal = database.is_connection_fatal(source.as_ref());
            (source, fatal)
        }
        Err(interrupted) => (interrupted.into(), false),
    };

    warn!(
        db_name = %handle.target(),
        role = %username.role_name,
        connection_fatal,
        error = %source,
        "credential generation failed"
    );
    Err(Error::Generation {
        target: handle.target().to_string(),
        connection_fatal,
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::testing::{MockDatabase, MockFailure};

    fn username() -> UsernameConfig {
        UsernameConfig {
            display_name: "token-alice".into(),
            role_name: "readonly".into(),
        }
    }

    fn handle(database: Arc<MockDatabase>) -> ConnectionHandle {
        ConnectionHandle::new("analytics".into(), 1, database)
    }

    #[tokio::test]
    async fn returns_generated_credential() {
        let database = Arc::new(MockDatabase::new("mock"));
        let credential = generate(
            &handle(database.clone()),
            &Statements::creation(["CREATE ROLE x"]),
            &username(),
            Utc::now(),
            &RequestContext::new("token-alice"),
        )
        .await
        .unwrap();

        assert!(credential.username.contains("readonly"));
        assert!(!credential.password.expose_secret().is_empty());
        assert_eq!(database.create_count(), 1);
    }

    #[tokio::test]
    async fn classifies_fatal_failures() {
        let database = Arc::new(MockDatabase::new("mock"));
        database.fail_next_create(MockFailure::ConnectionLost);

        let err = generate(
            &handle(database),
            &Statements::default(),
            &username(),
            Utc::now(),
            &RequestContext::new("x"),
        )
        .await
        .unwrap_err();

        assert!(err.is_connection_fatal());
        assert!(err.may_have_side_effects());
    }

    #[tokio::test]
    async fn rejected_statement_is_not_fatal() {
        let database = Arc::new(MockDatabase::new("mock"));
        database.fail_next_create(MockFailure::Rejected);

        let err = generate(
            &handle(database),
            &Statements::default(),
            &username(),
            Utc::now(),
            &RequestContext::new("x"),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Generation {
                connection_fatal: false,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_not_fatal() {
        let latency = Duration::from_secs(10);
        let database = Arc::new(MockDatabase::new("mock").with_create_latency(latency));
        let ctx = RequestContext::new("x").with_timeout(Duration::from_secs(1));

        let err = generate(
            &handle(database),
            &Statements::default(),
            &username(),
            Utc::now(),
            &ctx,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Generation {
                connection_fatal: false,
                ..
            }
        ));
    }
}
