pub mod gemini;
pub mod transport;

pub use gemini::GeminiGenerator;
pub use transport::ReqwestTransport;
