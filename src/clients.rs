pub mod generation;

pub use generation::{
    ChatCompletionClient, DisabledGenerator, GenerationError, GenerationSettings, TextGenerator,
};
