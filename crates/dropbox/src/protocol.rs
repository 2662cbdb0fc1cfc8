//! Wire payloads for the Dropbox v2 API
//!
//! Only the fields ferry consumes are modeled; unknown fields are
//! ignored on deserialization.

use serde::{Deserialize, Serialize};

/// files_* metadata union, tagged by Dropbox's `.tag` discriminator
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    Deleted(DeletedMetadata),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    pub size: u64,
    pub rev: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    /// RFC 3339 timestamp as reported by the server
    #[serde(default)]
    pub server_modified: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedMetadata {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// Write mode for upload commits
#[derive(Debug, Clone, Serialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub enum WriteMode {
    Overwrite,
    /// Overwrite only if the current revision matches
    Update { update: String },
}

/// Commit info shared by files/upload and upload_session/finish
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
}

impl CommitInfo {
    pub fn overwrite(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: WriteMode::Overwrite,
            autorename: false,
            mute: true,
        }
    }

    pub fn update(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: WriteMode::Update {
                update: revision.into(),
            },
            autorename: false,
            mute: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListFolderArg {
    pub path: String,
    pub recursive: bool,
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListFolderResult {
    pub entries: Vec<Metadata>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ListFolderContinueArg {
    pub cursor: String,
}

#[derive(Debug, Serialize)]
pub struct PathArg {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct RelocationArg {
    pub from_path: String,
    pub to_path: String,
}

/// `{"metadata": ...}` envelope returned by delete_v2 and move_v2
#[derive(Debug, Deserialize)]
pub struct MetadataResult {
    #[allow(dead_code)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionStartArg {
    pub close: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadSessionStartResult {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionCursor {
    pub session_id: String,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionAppendArg {
    pub cursor: UploadSessionCursor,
    pub close: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionFinishArg {
    pub cursor: UploadSessionCursor,
    pub commit: CommitInfo,
}

/// Body of a 409 response; `error_summary` strings like
/// `path/not_found/..` drive the error mapping
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_summary: String,
}

/// oauth2/token response for refresh_token grants
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}
