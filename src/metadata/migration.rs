//! Schema migration chain: repeatedly applies registered
//! `v -> v+1` migrations until the document reports `SCHEMA_VERSION`,
//! backing up the original bytes first.

use std::path::Path;

use serde_json::Value;

use crate::error::{AppError, ErrorCode};

use super::schema::SCHEMA_VERSION;

type MigrationFn = fn(Value) -> Value;

/// Registered in ascending order of the version they migrate *from*.
/// Empty today: `SCHEMA_VERSION` is 1, the first shape this crate ever
/// wrote. A future bump adds an entry here, never rewrites an existing one.
const MIGRATIONS: &[(u32, MigrationFn)] = &[];

/// Reads the document's `version` field, and if it is older than
/// [`SCHEMA_VERSION`], applies the registered migration chain, writing a
/// `<name>.bak.<unix-ts>` backup of the original bytes before returning the
/// migrated document. Versions newer than `SCHEMA_VERSION` are rejected.
/// Documents already at `SCHEMA_VERSION` pass through unchanged.
pub fn migrate_to_current(raw: &str, source_path: &Path) -> Result<String, AppError> {
    migrate_with(raw, source_path, MIGRATIONS, SCHEMA_VERSION)
}

/// Same algorithm as [`migrate_to_current`], parameterized over the
/// migration chain and target version so tests can exercise a non-empty
/// chain without waiting for a real schema bump.
fn migrate_with(raw: &str, source_path: &Path, migrations: &[(u32, MigrationFn)], target_version: u32) -> Result<String, AppError> {
    let mut value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::new(ErrorCode::SchemaInvalid, "metadata file is not valid JSON").with_details(e.to_string()))?;

    let version = read_version(&value)?;
    if version > target_version {
        return Err(AppError::new(
            ErrorCode::SchemaUnsupported,
            format!("metadata file version {version} is newer than supported version {target_version}"),
        )
        .with_guidance("upgrade gitcuttle to a version that supports this metadata schema"));
    }
    if version == target_version {
        return Ok(raw.to_string());
    }

    backup_original(raw, source_path)?;

    let mut current_version = version;
    while current_version < target_version {
        let Some((_, migration)) = migrations.iter().find(|(from, _)| *from == current_version) else {
            return Err(AppError::new(
                ErrorCode::SchemaInvalid,
                format!("no registered migration from schema version {current_version}"),
            ));
        };
        value = migration(value);
        let new_version = read_version(&value)?;
        if new_version <= current_version {
            return Err(AppError::new(
                ErrorCode::SchemaInvalid,
                format!("migration from version {current_version} did not advance the schema version"),
            ));
        }
        current_version = new_version;
    }

    serde_json::to_string(&value)
        .map_err(|e| AppError::new(ErrorCode::SchemaInvalid, "failed to serialize migrated metadata").with_details(e.to_string()))
}

fn read_version(value: &Value) -> Result<u32, AppError> {
    value
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| AppError::new(ErrorCode::SchemaInvalid, "metadata file is missing a positive integer version"))
}

/// Copies `raw` to `<source_path>.bak.<unix-ts>`, incrementing the
/// timestamp suffix until a non-existing name is found.
fn backup_original(raw: &str, source_path: &Path) -> Result<(), AppError> {
    let mut ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    loop {
        let backup_path = source_path.with_extension(format!(
            "{}.bak.{ts}",
            source_path.extension().and_then(|e| e.to_str()).unwrap_or("json")
        ));
        if !backup_path.exists() {
            std::fs::write(&backup_path, raw).map_err(|e| {
                AppError::new(ErrorCode::SchemaInvalid, format!("failed to write migration backup at {}", backup_path.display()))
                    .with_details(e.to_string())
            })?;
            return Ok(());
        }
        ts += 1;
    }
}
