//! Conversions from external infrastructure errors into domain errors.

use hubrelay_domain::HubRelayError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub HubRelayError);

impl From<InfraError> for HubRelayError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<HubRelayError> for InfraError {
    fn from(value: HubRelayError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoHubRelayError {
    fn into_hubrelay(self) -> HubRelayError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → HubRelayError */
/* -------------------------------------------------------------------------- */

impl IntoHubRelayError for SqlError {
    fn into_hubrelay(self) -> HubRelayError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        HubRelayError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        HubRelayError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        HubRelayError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 275) => {
                        HubRelayError::Database(format!("check constraint violation: {message}"))
                    }
                    _ => HubRelayError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => HubRelayError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                HubRelayError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                HubRelayError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidPath(path) => HubRelayError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => HubRelayError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_hubrelay())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → HubRelayError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(HubRelayError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → HubRelayError */
/* -------------------------------------------------------------------------- */

impl IntoHubRelayError for HttpError {
    fn into_hubrelay(self) -> HubRelayError {
        if self.is_timeout() {
            return HubRelayError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return HubRelayError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return HubRelayError::Config(format!("invalid HTTP client setup: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => HubRelayError::Auth(message),
                404 => HubRelayError::NotFound(message),
                400..=499 => HubRelayError::InvalidInput(message),
                _ => HubRelayError::Network(message),
            };
        }

        if self.is_decode() {
            return HubRelayError::Serialization(format!("failed to decode HTTP body: {self}"));
        }

        HubRelayError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_hubrelay())
    }
}

/* -------------------------------------------------------------------------- */
/* Serialization */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        Self(HubRelayError::Serialization(value.to_string()))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        Self(HubRelayError::Config(format!("invalid TOML: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use rusqlite::Error as SqlError;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: HubRelayError = InfraError::from(err).into();
        match mapped {
            HubRelayError::Database(msg) => assert!(msg.contains("busy")),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: HubRelayError = InfraError::from(SqlError::QueryReturnedNoRows).into();

        assert!(matches!(mapped, HubRelayError::NotFound(_)));
    }

    #[test]
    fn toml_errors_map_to_config() {
        let err = toml::from_str::<toml::Table>("[hub").unwrap_err();

        let mapped: HubRelayError = InfraError::from(err).into();

        assert_eq!(mapped.label(), "config");
    }

    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: HubRelayError = InfraError::from(error).into();
        match mapped {
            HubRelayError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {other:?}"),
        }
    }
}
