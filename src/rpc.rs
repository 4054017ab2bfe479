//! Request/reply primitives over a peer channel: correlation-id `call` and
//! `wait_for_type`, both with a timeout and optional channel close on
//! timeout. Waits are plain futures; dropping one on settlement releases
//! the timer and the channel borrow in one step, so nothing leaks and
//! nothing can resolve twice.

use crate::channel::{ChannelEvent, PeerChannel};
use crate::messages::GameDto;
use std::time::Duration;
use tokio::time;
use tracing::debug;

#[derive(Debug, PartialEq, Eq)]
pub enum RpcError {
    /// No matching message arrived within the bound.
    Timeout,
    /// The channel closed or errored before a match arrived.
    ChannelClosed,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout => write!(f, "timed out waiting for message"),
            RpcError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone)]
pub struct CallOptions {
    pub wait_for_reply: bool,
    pub timeout: Duration,
    pub close_on_timeout: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            wait_for_reply: true,
            timeout: Duration::from_secs(10),
            close_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub close_on_timeout: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            close_on_timeout: false,
        }
    }
}

/// Sends `dto` and, unless fire-and-forget, resolves with the first inbound
/// message whose `replyTo` matches the sent id.
///
/// With `wait_for_reply = false` the call resolves `Ok(None)` immediately
/// after the send attempt: no delivery guarantee, and a failed send is not
/// surfaced. Action messages tolerate loss; the sender just sees no
/// follow-up broadcast.
pub async fn call(
    channel: &mut PeerChannel,
    dto: GameDto,
    options: CallOptions,
) -> Result<Option<GameDto>, RpcError> {
    let sent_id = dto.id.clone();
    let delivered = channel.send(&dto);

    if !options.wait_for_reply {
        return Ok(None);
    }
    if !delivered {
        return Err(RpcError::ChannelClosed);
    }

    let wait = recv_matching(channel, |dto| dto.reply_to.as_deref() == Some(sent_id.as_str()));
    match time::timeout(options.timeout, wait).await {
        Ok(result) => result.map(Some),
        Err(_) => {
            if options.close_on_timeout {
                channel.close();
            }
            Err(RpcError::Timeout)
        }
    }
}

/// Resolves with the first inbound message of the given wire type,
/// correlation ids ignored. Failure modes are symmetric to `call`.
pub async fn wait_for_type(
    channel: &mut PeerChannel,
    wanted: &str,
    options: WaitOptions,
) -> Result<GameDto, RpcError> {
    let wait = recv_matching(channel, |dto| dto.body.kind() == wanted);
    match time::timeout(options.timeout, wait).await {
        Ok(result) => result,
        Err(_) => {
            if options.close_on_timeout {
                channel.close();
            }
            Err(RpcError::Timeout)
        }
    }
}

/// Drains the channel until `matches` accepts a frame. Unparseable frames
/// are protocol errors: logged and dropped. Non-matching frames belong to
/// other listeners and are skipped.
async fn recv_matching(
    channel: &mut PeerChannel,
    matches: impl Fn(&GameDto) -> bool,
) -> Result<GameDto, RpcError> {
    loop {
        match channel.recv().await {
            Some(ChannelEvent::Data(raw)) => match serde_json::from_str::<GameDto>(&raw) {
                Ok(dto) if matches(&dto) => return Ok(dto),
                Ok(dto) => debug!("rpc: skipping {} frame", dto.body.kind()),
                Err(e) => debug!("rpc: dropping unparseable frame: {}", e),
            },
            Some(ChannelEvent::Closed) | None => return Err(RpcError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DtoBody, JoinResponse};
    use crate::state::{GameState, PlayerIdentity};

    fn join_request() -> GameDto {
        GameDto::new(DtoBody::RequestToJoin {
            player: PlayerIdentity::new("u1", "Anna"),
        })
    }

    #[tokio::test]
    async fn test_call_resolves_on_matching_reply() {
        let (mut caller, mut callee) = PeerChannel::pair("guest", "host");

        let responder = tokio::spawn(async move {
            let request = match callee.recv().await {
                Some(ChannelEvent::Data(raw)) => serde_json::from_str::<GameDto>(&raw).unwrap(),
                other => panic!("unexpected event: {:?}", other),
            };
            // An unrelated push first; the caller must skip it.
            callee.send(&GameDto::new(DtoBody::SyncGameState(GameState::Waiting {
                players: vec![],
            })));
            callee.send(&GameDto::reply(
                DtoBody::RequestToJoinResponse(JoinResponse::Rejected {
                    reason: "nope".to_string(),
                }),
                &request.id,
            ));
        });

        let reply = call(&mut caller, join_request(), CallOptions::default())
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            DtoBody::RequestToJoinResponse(JoinResponse::Rejected { reason }) => {
                assert_eq!(reason, "nope")
            }
            other => panic!("unexpected body: {:?}", other),
        }
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_fire_and_forget_resolves_immediately() {
        let (mut caller, _callee) = PeerChannel::pair("guest", "host");
        let options = CallOptions {
            wait_for_reply: false,
            ..CallOptions::default()
        };
        let result = call(&mut caller, GameDto::new(DtoBody::PlayCard), options).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fire_and_forget_swallows_send_failure() {
        let (mut caller, callee) = PeerChannel::pair("guest", "host");
        drop(callee);
        let options = CallOptions {
            wait_for_reply: false,
            ..CallOptions::default()
        };
        let result = call(&mut caller, GameDto::new(DtoBody::PlayCard), options).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out_and_closes_when_asked() {
        let (mut caller, mut callee) = PeerChannel::pair("guest", "host");
        let options = CallOptions {
            timeout: Duration::from_millis(100),
            close_on_timeout: true,
            ..CallOptions::default()
        };
        let err = call(&mut caller, join_request(), options).await.unwrap_err();
        assert_eq!(err, RpcError::Timeout);

        // The remote end observes the close. First frame is the request.
        assert!(matches!(callee.recv().await, Some(ChannelEvent::Data(_))));
        assert!(matches!(callee.recv().await, Some(ChannelEvent::Closed)));
    }

    #[tokio::test]
    async fn test_call_fails_on_closed_channel() {
        let (mut caller, callee) = PeerChannel::pair("guest", "host");
        drop(callee);
        let err = call(&mut caller, join_request(), CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::ChannelClosed);
    }

    #[tokio::test]
    async fn test_wait_for_type_ignores_correlation_and_other_types() {
        let (tx, mut rx) = PeerChannel::pair("host", "guest");
        tx.send(&GameDto::new(DtoBody::PlayCard));
        tx.send(&GameDto::reply(
            DtoBody::RequestToJoin {
                player: PlayerIdentity::new("u2", "Boris"),
            },
            "some-id",
        ));

        let dto = wait_for_type(&mut rx, "request-to-join", WaitOptions::default())
            .await
            .unwrap();
        match dto.body {
            DtoBody::RequestToJoin { player } => assert_eq!(player.name, "Boris"),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_type_timeout() {
        let (_tx, mut rx) = PeerChannel::pair("host", "guest");
        let options = WaitOptions {
            timeout: Duration::from_millis(100),
            close_on_timeout: false,
        };
        let err = wait_for_type(&mut rx, "request-to-join", options)
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::Timeout);
    }
}
