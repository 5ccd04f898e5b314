pub mod chat_llm;
pub mod db;
pub mod sst;
pub mod tts;
pub mod tutor_llm;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbKeyValueStore;
pub use sst::OpenAiSstAdapter;
pub use tts::OpenAiTtsAdapter;
pub use tutor_llm::OpenAiTutorAdapter;
