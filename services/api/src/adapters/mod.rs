pub mod camera;
pub mod clipboard;
pub mod kv_sqlite;
pub mod llm;
pub mod render;

pub use camera::ReportedCamera;
pub use clipboard::BufferedClipboard;
pub use kv_sqlite::SqliteKvStore;
pub use llm::OpenAiGenerativeAdapter;
pub use render::RasterRenderer;
