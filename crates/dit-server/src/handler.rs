use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use axum::extract::{Multipart, State};
use axum::response::Json;
use dit_protocol::{fields, DeployForm, DeployResponse, HealthResponse, DEFAULT_TAG};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

/// File holding the tag of the last deploy inside an app directory.
pub const TAG_FILE_NAME: &str = ".dit-tag";

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Apply one delta upload to `<apps_root>/<name>`.
pub async fn deploy_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ServerResult<Json<DeployResponse>> {
    let form = read_form(multipart).await?;
    form.validate()?;
    info!(
        name = %form.name,
        tag = %form.tag,
        deleted = form.deleted.len(),
        archive_bytes = form.archive.as_ref().map_or(0, Vec::len),
        "deploy received"
    );

    let apps_root = state.config.apps_root.clone();
    let response = tokio::task::spawn_blocking(move || apply_deploy(&apps_root, form))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    info!(
        name = %response.name,
        extracted = response.extracted.len(),
        deleted = response.deleted.len(),
        "deploy applied"
    );
    Ok(Json(response))
}

async fn read_form(mut multipart: Multipart) -> ServerResult<DeployForm> {
    let mut name = None;
    let mut tag = None;
    let mut deleted = Vec::new();
    let mut archive = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            fields::NAME => name = Some(field.text().await?),
            fields::TAG => tag = Some(field.text().await?),
            fields::DELETED => deleted = DeployForm::decode_deleted(&field.text().await?)?,
            fields::FILE => archive = Some(field.bytes().await?.to_vec()),
            other => {
                debug!(field = other, "ignoring unknown form field");
            }
        }
    }

    let name = name.ok_or_else(|| ServerError::BadRequest("missing `name` field".into()))?;
    let tag = tag
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TAG.to_string());

    let mut form = DeployForm::new(name, tag).with_deleted(deleted);
    form.archive = archive;
    Ok(form)
}

/// Remove deleted files, unpack the archive, and record the tag.
///
/// The form must already be validated.
pub fn apply_deploy(apps_root: &Path, form: DeployForm) -> ServerResult<DeployResponse> {
    let app_dir = apps_root.join(&form.name);
    fs::create_dir_all(&app_dir)?;

    let mut removed = Vec::with_capacity(form.deleted.len());
    for path in &form.deleted {
        let target = app_dir.join(path);
        match fs::remove_file(&target) {
            Ok(()) => {
                debug!(path = %path, "removed");
                prune_empty_parents(&app_dir, &target);
                removed.push(path.clone());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path, "deleted path was not present");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let extracted = match form.archive {
        Some(bytes) => dit_pack::extract_archive(Cursor::new(bytes), &app_dir)?,
        None => Vec::new(),
    };

    fs::write(app_dir.join(TAG_FILE_NAME), format!("{}\n", form.tag))?;

    Ok(DeployResponse {
        name: form.name,
        tag: form.tag,
        extracted,
        deleted: removed,
    })
}

/// Remove now-empty directories between `removed` and `app_dir`.
fn prune_empty_parents(app_dir: &Path, removed: &Path) {
    let mut current = removed.parent();
    while let Some(dir) = current {
        if dir == app_dir || !dir.starts_with(app_dir) {
            break;
        }
        // Fails on non-empty directories, which ends the climb.
        if fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
