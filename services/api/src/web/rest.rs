//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    body::Body,
    extract::{Extension, Multipart, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_assistant_core::{
    orchestrator::RequestState, CapturedFrame, ChatMessage, ChatRole, ClipboardItem, Completion,
    ExportFormat, ExportOutcome, FilePart, GenerationResult, InstructionOverride, Mode,
    PageLayout, PickedFile, QuestionCategory, QuestionTypes, Subject, UploadTarget,
};
use tracing::{debug, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::auth::{self, LoginRequest, RegisterRequest, SessionResponse, UserResponse};
use crate::web::state::Workspace;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        upload_handler,
        paste_handler,
        list_files_handler,
        remove_file_handler,
        camera_open_handler,
        camera_capture_handler,
        camera_close_handler,
        settings_handler,
        generate_handler,
        search_handler,
        chat_handler,
        refine_handler,
        current_result_handler,
        clear_result_handler,
        history_handler,
        select_history_handler,
        clear_history_handler,
        export_handler,
        list_users_handler,
        get_config_handler,
        update_config_handler,
    ),
    components(schemas(
        RegisterRequest, LoginRequest, UserResponse, SessionResponse, FileResponse,
        UploadResponse, PasteRequest, PastedItem, CameraOpenRequest, CameraCaptureRequest,
        QuestionTypeSetting, SettingsRequest, SettingsResponse, GenerateRequest, QueryRequest,
        RefineRequest, MessageResponse, ResultResponse, CompletionResponse,
        CurrentResultResponse, ExportKind, LayoutParam, ExportRequest, CopiedResponse,
        InstructionRequest, InstructionResponse,
    )),
    tags(
        (name = "Study Assistant API", description = "Question papers, answers and chat over uploaded textbook pages.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct FileResponse {
    pub name: String,
    pub mime_type: String,
    /// The file as a data URI, for previews.
    pub data: String,
}

impl From<FilePart> for FileResponse {
    fn from(part: FilePart) -> Self {
        Self {
            name: part.name,
            mime_type: part.mime_type,
            data: part.data,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub added: usize,
    pub files: Vec<FileResponse>,
}

#[derive(Deserialize, ToSchema)]
pub struct PastedItem {
    pub mime_type: String,
    /// Base64 or a data URI.
    pub data: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasteRequest {
    pub items: Vec<PastedItem>,
}

#[derive(Deserialize, ToSchema)]
pub struct CameraOpenRequest {
    /// Whether the browser granted camera access.
    pub granted: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CameraCaptureRequest {
    #[schema(value_type = String)]
    pub target: UploadTarget,
    /// The captured JPEG frame, as base64 or a data URI.
    pub data: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct QuestionTypeSetting {
    #[schema(value_type = String)]
    pub category: QuestionCategory,
    pub enabled: bool,
    pub count: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct SettingsRequest {
    #[schema(value_type = Option<String>)]
    pub subject: Option<Subject>,
    #[serde(default)]
    pub question_types: Vec<QuestionTypeSetting>,
}

#[derive(Serialize, ToSchema)]
pub struct SettingsResponse {
    #[schema(value_type = String)]
    pub subject: Subject,
    pub question_types: Vec<QuestionTypeSetting>,
}

impl SettingsResponse {
    fn new(subject: Subject, types: &QuestionTypes) -> Self {
        let question_types = QuestionCategory::ALL
            .iter()
            .map(|category| {
                let config = types.get(*category);
                QuestionTypeSetting {
                    category: *category,
                    enabled: config.enabled,
                    count: config.count,
                }
            })
            .collect();
        Self {
            subject,
            question_types,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    #[serde(default)]
    pub custom_instruction: String,
}

#[derive(Deserialize, ToSchema)]
pub struct QueryRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefineRequest {
    pub instruction: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub role: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: match message.role {
                ChatRole::User => "user".to_string(),
                ChatRole::Ai => "ai".to_string(),
            },
            text: message.text,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ResultResponse {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub mode: Mode,
    #[schema(value_type = String)]
    pub subject: Subject,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub image_count: usize,
    pub query: Option<String>,
    pub transcript: Vec<MessageResponse>,
    pub supersedes: Option<Uuid>,
}

impl From<GenerationResult> for ResultResponse {
    fn from(result: GenerationResult) -> Self {
        Self {
            id: result.id,
            mode: result.mode,
            subject: result.subject,
            content: result.content,
            created_at: result.created_at,
            image_count: result.image_count,
            query: result.query,
            transcript: result
                .transcript
                .unwrap_or_default()
                .into_iter()
                .map(MessageResponse::from)
                .collect(),
            supersedes: result.supersedes,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CompletionResponse {
    /// False when a newer request was issued before this one finished.
    pub displayed: bool,
    pub result: ResultResponse,
}

impl From<Completion> for CompletionResponse {
    fn from(completion: Completion) -> Self {
        Self {
            displayed: completion.displayed,
            result: completion.result.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CurrentResultResponse {
    pub result: Option<ResultResponse>,
    /// The mode of the newest request still in flight, if any.
    pub pending: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Clipboard,
    Word,
    Image,
    Pdf,
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutParam {
    #[default]
    SinglePage,
    MultiPage,
}

#[derive(Deserialize, ToSchema)]
pub struct ExportRequest {
    pub format: ExportKind,
    #[serde(default)]
    pub layout: LayoutParam,
    /// A result from history; the displayed result when absent.
    pub result_id: Option<Uuid>,
}

impl ExportRequest {
    fn export_format(&self) -> ExportFormat {
        match self.format {
            ExportKind::Clipboard => ExportFormat::Clipboard,
            ExportKind::Word => ExportFormat::Word,
            ExportKind::Image => ExportFormat::Image,
            ExportKind::Pdf => ExportFormat::Pdf {
                layout: match self.layout {
                    LayoutParam::SinglePage => PageLayout::SinglePage,
                    LayoutParam::MultiPage => PageLayout::MultiPage,
                },
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CopiedResponse {
    /// The text the browser should place on the clipboard.
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct InstructionRequest {
    /// Blank text removes the override.
    pub system_instruction: String,
}

#[derive(Serialize, ToSchema)]
pub struct InstructionResponse {
    pub version: u32,
    pub system_instruction: String,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl From<InstructionOverride> for InstructionResponse {
    fn from(record: InstructionOverride) -> Self {
        Self {
            version: record.version,
            system_instruction: record.system_instruction,
            updated_by: record.updated_by,
            updated_at: record.updated_at,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Accepts plain base64 or a `data:<mime>;base64,<payload>` URI.
fn decode_data(data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, p)| p).unwrap_or(rest),
        None => data,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 data: {}", e)))
}

async fn files_of(workspace: &Workspace, target: UploadTarget) -> Vec<FileResponse> {
    workspace
        .assistant
        .files(target)
        .await
        .into_iter()
        .map(FileResponse::from)
        .collect()
}

//=========================================================================================
// Uploads & camera
//=========================================================================================

/// Add picked files to an upload list.
///
/// Accepts a multipart/form-data request; every file part is added.
#[utoipa::path(
    post,
    path = "/uploads/{target}",
    params(("target" = String, Path, description = "`main` or `chat`")),
    request_body(content_type = "multipart/form-data", description = "Images or PDFs."),
    responses(
        (status = 200, description = "Files added", body = UploadResponse),
        (status = 400, description = "Unsupported or oversized file")
    )
)]
pub async fn upload_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Path(target): Path<UploadTarget>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut picked = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.file_name().unwrap_or("untitled").to_string();
        let mime_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {}", e)))?;
        picked.push(PickedFile {
            name,
            mime_type,
            bytes,
        });
    }
    let added = workspace.assistant.upload(target, picked).await?;
    debug!(?target, added, "Upload stored.");
    Ok(Json(UploadResponse {
        added,
        files: files_of(&workspace, target).await,
    }))
}

/// Add the file items of a clipboard paste; text items are skipped.
#[utoipa::path(
    post,
    path = "/uploads/{target}/clipboard",
    params(("target" = String, Path, description = "`main` or `chat`")),
    request_body = PasteRequest,
    responses((status = 200, description = "Items added", body = UploadResponse))
)]
pub async fn paste_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Path(target): Path<UploadTarget>,
    Json(req): Json<PasteRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut items = Vec::with_capacity(req.items.len());
    for item in req.items {
        items.push(ClipboardItem {
            bytes: Bytes::from(decode_data(&item.data)?),
            mime_type: item.mime_type,
        });
    }
    let added = workspace.assistant.paste(target, items).await?;
    Ok(Json(UploadResponse {
        added,
        files: files_of(&workspace, target).await,
    }))
}

#[utoipa::path(
    get,
    path = "/uploads/{target}",
    params(("target" = String, Path, description = "`main` or `chat`")),
    responses((status = 200, description = "Current files", body = [FileResponse]))
)]
pub async fn list_files_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Path(target): Path<UploadTarget>,
) -> Json<Vec<FileResponse>> {
    Json(files_of(&workspace, target).await)
}

#[utoipa::path(
    delete,
    path = "/uploads/{target}/{index}",
    params(
        ("target" = String, Path, description = "`main` or `chat`"),
        ("index" = usize, Path, description = "Position in the list")
    ),
    responses(
        (status = 200, description = "Remaining files", body = [FileResponse]),
        (status = 400, description = "No file at that index")
    )
)]
pub async fn remove_file_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Path((target, index)): Path<(UploadTarget, usize)>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    workspace.assistant.remove_file(target, index).await?;
    Ok(Json(files_of(&workspace, target).await))
}

/// Open the camera once the browser reports the permission outcome.
#[utoipa::path(
    post,
    path = "/camera/open",
    request_body = CameraOpenRequest,
    responses(
        (status = 204, description = "Camera open"),
        (status = 403, description = "Camera permission denied")
    )
)]
pub async fn camera_open_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<CameraOpenRequest>,
) -> Result<StatusCode, ApiError> {
    workspace.camera.report_permission(req.granted);
    workspace.assistant.open_camera(workspace.camera.as_ref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Store the frame the browser captured and close the camera.
#[utoipa::path(
    post,
    path = "/camera/capture",
    request_body = CameraCaptureRequest,
    responses(
        (status = 200, description = "Photo added", body = FileResponse),
        (status = 400, description = "Camera is not open")
    )
)]
pub async fn camera_capture_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<CameraCaptureRequest>,
) -> Result<Json<FileResponse>, ApiError> {
    workspace.camera.push_frame(CapturedFrame {
        bytes: decode_data(&req.data)?,
        mime_type: "image/jpeg".to_string(),
    })?;
    let part = workspace.assistant.capture_photo(req.target).await?;
    Ok(Json(part.into()))
}

#[utoipa::path(
    post,
    path = "/camera/close",
    responses((status = 204, description = "Camera closed"))
)]
pub async fn camera_close_handler(Extension(workspace): Extension<Arc<Workspace>>) -> StatusCode {
    workspace.assistant.close_camera().await;
    StatusCode::NO_CONTENT
}

//=========================================================================================
// Settings & generation
//=========================================================================================

/// Update the subject and question-type selection. Omitted fields are unchanged.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsRequest,
    responses((status = 200, description = "Settings now in effect", body = SettingsResponse))
)]
pub async fn settings_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<SettingsRequest>,
) -> Json<SettingsResponse> {
    if let Some(subject) = req.subject {
        workspace.assistant.set_subject(subject).await;
    }
    for setting in req.question_types {
        workspace
            .assistant
            .set_question_type(setting.category, setting.enabled, setting.count)
            .await;
    }
    let (subject, types) = workspace.assistant.settings().await;
    Json(SettingsResponse::new(subject, &types))
}

/// Generate a question paper from the main upload list.
#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Question paper generated", body = CompletionResponse),
        (status = 400, description = "No files or no question type selected"),
        (status = 502, description = "The model call failed")
    )
)]
pub async fn generate_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let completion = workspace.assistant.generate(&req.custom_instruction).await?;
    info!(result_id = %completion.result.id, displayed = completion.displayed, "Paper generated.");
    Ok(Json(completion.into()))
}

#[utoipa::path(
    post,
    path = "/search",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Answer found", body = CompletionResponse),
        (status = 400, description = "Neither a query nor a file"),
        (status = 502, description = "The model call failed")
    )
)]
pub async fn search_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    Ok(Json(workspace.assistant.search(&req.text).await?.into()))
}

/// Send one chat message with the chat attachments.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Reply appended", body = CompletionResponse),
        (status = 400, description = "Empty message"),
        (status = 502, description = "The model call failed")
    )
)]
pub async fn chat_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    Ok(Json(workspace.assistant.chat(&req.text).await?.into()))
}

/// Rewrite the displayed question paper.
#[utoipa::path(
    post,
    path = "/refine",
    request_body = RefineRequest,
    responses(
        (status = 200, description = "Refined paper stored", body = CompletionResponse),
        (status = 400, description = "No question paper on display")
    )
)]
pub async fn refine_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<RefineRequest>,
) -> Result<Json<CompletionResponse>, ApiError> {
    Ok(Json(workspace.assistant.refine(&req.instruction).await?.into()))
}

//=========================================================================================
// Results & history
//=========================================================================================

#[utoipa::path(
    get,
    path = "/result",
    responses((status = 200, description = "The displayed result", body = CurrentResultResponse))
)]
pub async fn current_result_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Json<CurrentResultResponse> {
    let pending = match workspace.assistant.request_state() {
        RequestState::Idle => None,
        RequestState::Pending { mode, .. } => Some(mode.to_string()),
    };
    Json(CurrentResultResponse {
        result: workspace.assistant.current_result().await.map(ResultResponse::from),
        pending,
    })
}

#[utoipa::path(
    post,
    path = "/result/clear",
    responses((status = 204, description = "View reset"))
)]
pub async fn clear_result_handler(Extension(workspace): Extension<Arc<Workspace>>) -> StatusCode {
    workspace.assistant.clear_result().await;
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Past results, newest first", body = [ResultResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn history_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Result<Json<Vec<ResultResponse>>, ApiError> {
    let history = workspace.assistant.history().await?;
    Ok(Json(history.into_iter().map(ResultResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/history/{id}/select",
    params(("id" = Uuid, Path, description = "Result id")),
    responses(
        (status = 200, description = "Result on display", body = ResultResponse),
        (status = 404, description = "No such result")
    )
)]
pub async fn select_history_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultResponse>, ApiError> {
    Ok(Json(workspace.assistant.select_from_history(id).await?.into()))
}

#[utoipa::path(
    delete,
    path = "/history",
    responses((status = 204, description = "History deleted"))
)]
pub async fn clear_history_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Result<StatusCode, ApiError> {
    workspace.assistant.clear_history().await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Export
//=========================================================================================

/// Export a result. Files are returned as attachments; a clipboard copy returns
/// the text; a request made while another export is running returns 204.
#[utoipa::path(
    post,
    path = "/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "The exported file, or the text to copy", body = CopiedResponse),
        (status = 204, description = "Another export is still running"),
        (status = 404, description = "No such result")
    )
)]
pub async fn export_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let outcome = workspace
        .assistant
        .export(req.export_format(), req.result_id)
        .await?;
    match outcome {
        ExportOutcome::Ignored => Ok(StatusCode::NO_CONTENT.into_response()),
        ExportOutcome::Copied => {
            let text = workspace.clipboard.take().unwrap_or_default();
            Ok(Json(CopiedResponse { text }).into_response())
        }
        ExportOutcome::File(artifact) => {
            info!(file = %artifact.file_name, bytes = artifact.bytes.len(), "Export delivered.");
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, artifact.mime_type)
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", artifact.file_name),
                )
                .body(Body::from(artifact.bytes))
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
    }
}

//=========================================================================================
// Administration
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Every registered user", body = [UserResponse]),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn list_users_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = workspace.assistant.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/admin/config",
    responses(
        (status = 200, description = "The instruction override, if any", body = InstructionResponse),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn get_config_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
) -> Result<Json<Option<InstructionResponse>>, ApiError> {
    let record = workspace.assistant.instruction().await?;
    Ok(Json(record.map(InstructionResponse::from)))
}

/// Replace the built-in instructions for every request until cleared.
#[utoipa::path(
    put,
    path = "/admin/config",
    request_body = InstructionRequest,
    responses(
        (status = 200, description = "The new override, or null when cleared", body = InstructionResponse),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn update_config_handler(
    Extension(workspace): Extension<Arc<Workspace>>,
    Json(req): Json<InstructionRequest>,
) -> Result<Json<Option<InstructionResponse>>, ApiError> {
    let record = workspace
        .assistant
        .update_instruction(&req.system_instruction)
        .await?;
    Ok(Json(record.map(InstructionResponse::from)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_data_uris_and_plain_base64() {
        assert_eq!(decode_data("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_data("aGVsbG8=").unwrap(), b"hello");
        assert!(matches!(decode_data("%%%"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn export_request_maps_pdf_layout() {
        let req: ExportRequest =
            serde_json::from_str(r#"{"format":"pdf","layout":"multi_page"}"#).unwrap();
        assert_eq!(
            req.export_format(),
            ExportFormat::Pdf {
                layout: PageLayout::MultiPage
            }
        );
        let req: ExportRequest = serde_json::from_str(r#"{"format":"word"}"#).unwrap();
        assert_eq!(req.export_format(), ExportFormat::Word);
        assert!(req.result_id.is_none());
    }
}
