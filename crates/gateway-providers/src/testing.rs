//! Fixtures shared by the provider tests.

use gateway_core::{
    BackendDescriptor, BackendRequest, BackendTarget, ChatMessage, GenerationParams, MaxTokens,
    Temperature,
};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn descriptor(
    name: &str,
    target: BackendTarget,
    model: &str,
) -> Arc<BackendDescriptor> {
    let params = GenerationParams {
        temperature: Temperature::new(0.2).expect("temperature"),
        max_output_tokens: MaxTokens::new(512).expect("max tokens"),
    };
    Arc::new(
        BackendDescriptor::new(name, target, model, params).with_timeout(Duration::from_secs(5)),
    )
}

pub(crate) fn request(model: &str) -> BackendRequest {
    BackendRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system("You are an investment advisor."),
            ChatMessage::user("Should I buy index funds?"),
        ],
        temperature: Temperature::new(0.2).expect("temperature"),
        max_tokens: MaxTokens::new(256).expect("max tokens"),
    }
}
