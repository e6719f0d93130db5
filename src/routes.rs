//! Route templates for the interaction, followup and channel-message endpoints.
//!
//! Interaction and followup endpoints authenticate through the token in their path, so they are
//! marked [`unauthorized`](Route::unauthorized) and never carry the bot token.

use crate::route::{Method, Route};

pub const GET_INTERACTION_RESPONSE: Route = Route::new(
    Method::Get,
    "/webhooks/{application.id}/{interaction.token}/messages/@original",
)
.unauthorized();

pub const CREATE_INTERACTION_RESPONSE: Route =
    Route::new(Method::Post, "/interactions/{interaction.id}/{interaction.token}/callback")
        .unauthorized();

pub const UPDATE_INTERACTION_RESPONSE: Route = Route::new(
    Method::Patch,
    "/webhooks/{application.id}/{interaction.token}/messages/@original",
)
.unauthorized();

pub const DELETE_INTERACTION_RESPONSE: Route = Route::new(
    Method::Delete,
    "/webhooks/{application.id}/{interaction.token}/messages/@original",
)
.unauthorized();

pub const CREATE_FOLLOWUP_MESSAGE: Route =
    Route::new(Method::Post, "/webhooks/{application.id}/{interaction.token}").unauthorized();

pub const UPDATE_FOLLOWUP_MESSAGE: Route = Route::new(
    Method::Patch,
    "/webhooks/{application.id}/{interaction.token}/messages/{message.id}",
)
.unauthorized();

pub const DELETE_FOLLOWUP_MESSAGE: Route = Route::new(
    Method::Delete,
    "/webhooks/{application.id}/{interaction.token}/messages/{message.id}",
)
.unauthorized();

pub const GET_CHANNEL: Route = Route::new(Method::Get, "/channels/{channel.id}");

pub const GET_MESSAGES: Route = Route::new(Method::Get, "/channels/{channel.id}/messages");

pub const GET_MESSAGE: Route =
    Route::new(Method::Get, "/channels/{channel.id}/messages/{message.id}");

pub const CREATE_MESSAGE: Route = Route::new(Method::Post, "/channels/{channel.id}/messages");

pub const UPDATE_MESSAGE: Route =
    Route::new(Method::Patch, "/channels/{channel.id}/messages/{message.id}");

/// Message deletes share one bucket per channel.
pub const DELETE_MESSAGE: Route =
    Route::new(Method::Delete, "/channels/{channel.id}/messages/{message.id}")
        .with_bucket("channel:{channel.id}");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_parses() {
        let all = [
            GET_INTERACTION_RESPONSE,
            CREATE_INTERACTION_RESPONSE,
            UPDATE_INTERACTION_RESPONSE,
            DELETE_INTERACTION_RESPONSE,
            CREATE_FOLLOWUP_MESSAGE,
            UPDATE_FOLLOWUP_MESSAGE,
            DELETE_FOLLOWUP_MESSAGE,
            GET_CHANNEL,
            GET_MESSAGES,
            GET_MESSAGE,
            CREATE_MESSAGE,
            UPDATE_MESSAGE,
            DELETE_MESSAGE,
        ];
        for route in all {
            assert!(!route.placeholders().unwrap().is_empty(), "{}", route.path());
        }
    }

    #[test]
    fn message_deletes_bucket_per_channel() {
        let first = DELETE_MESSAGE.compile(&[&10u64, &1u64]).unwrap();
        let second = DELETE_MESSAGE.compile(&[&10u64, &2u64]).unwrap();
        assert_eq!(first.bucket_key().as_str(), "channel:10:DELETE");
        assert_eq!(first.bucket_key(), second.bucket_key());
    }

    #[test]
    fn followups_bucket_per_interaction_token() {
        let a = UPDATE_FOLLOWUP_MESSAGE.compile(&[&1u64, &"tok", &5u64]).unwrap();
        let b = UPDATE_FOLLOWUP_MESSAGE.compile(&[&1u64, &"tok", &6u64]).unwrap();
        assert_eq!(a.bucket_key(), b.bucket_key());
        assert_eq!(a.path(), "/webhooks/1/tok/messages/5");
        assert!(!UPDATE_FOLLOWUP_MESSAGE.is_authorized());
        assert!(CREATE_MESSAGE.is_authorized());
    }
}
