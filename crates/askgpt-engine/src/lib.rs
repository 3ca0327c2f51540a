//! Chat client, transports and the question/answer session pipeline.

pub mod client;
pub mod config;
pub mod session;
pub mod transport;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use session::{Answer, AskSession, SessionOptions, SessionState, DEFAULT_MODEL};
pub use transport::{
    default_transport_registry, ChatTransport, DryrunTransport, OpenAiTransport, TransportRegistry,
};
