//! Model endpoint clients for Chatloom.
//!
//! One implementation covers every OpenAI-compatible chat-completions
//! endpoint, which includes Groq, OpenAI, and local vLLM/Ollama servers.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
