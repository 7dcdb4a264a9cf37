//! Negotiation and login: RequestNetworkSettings, Login and the
//! encryption handshake.

use bedrock_crypto::begin_handshake;
use bedrock_proto::jwt::extract_identity;
use bedrock_proto::packets::{
    id, is_supported_version, NetworkSettings, PlayStatus, PlayStatusType,
    ServerToClientHandshake, PROTOCOL_VERSION,
};
use bedrock_proto::{CompressionAlgorithm, GamePacket};
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, EventResult, HandlerContext, PacketHandler};
use crate::error::HandlerError;
use crate::session::LoginState;

#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    pub compression: CompressionAlgorithm,
    pub compression_threshold: u16,
    pub encryption: bool,
}

/// Register the login handlers.
pub fn register(dispatcher: &mut Dispatcher, settings: &NegotiationSettings) {
    dispatcher.register(
        id::REQUEST_NETWORK_SETTINGS,
        NetworkSettingsHandler {
            settings: NetworkSettings {
                compression_threshold: settings.compression_threshold,
                compression_algorithm: settings.compression,
                ..NetworkSettings::default()
            },
        },
    );
    dispatcher.register(
        id::LOGIN,
        LoginHandler {
            encryption: settings.encryption,
        },
    );
    dispatcher.register(id::CLIENT_TO_SERVER_HANDSHAKE, HandshakeHandler);
}

fn expect_state(
    ctx: &HandlerContext<'_>,
    expected: LoginState,
    packet: &'static str,
) -> Result<(), HandlerError> {
    if ctx.login.state != expected {
        return Err(HandlerError::OutOfOrder {
            packet,
            state: ctx.login.state,
        });
    }
    Ok(())
}

/// Answer an unsupported protocol with the matching PlayStatus and close.
fn reject_version(ctx: &mut HandlerContext<'_>, version: i32) -> EventResult {
    let (status, reason) = if version < PROTOCOL_VERSION {
        (PlayStatusType::FailedClient, "Outdated client")
    } else {
        (PlayStatusType::FailedServer, "Outdated server")
    };
    info!(
        "Protocol mismatch from {}: got {version}, speaking {PROTOCOL_VERSION}",
        ctx.addr
    );
    ctx.send(PlayStatus::new(status));
    ctx.disconnect(reason);
    EventResult::Cancelled
}

struct NetworkSettingsHandler {
    settings: NetworkSettings,
}

impl PacketHandler for NetworkSettingsHandler {
    fn handle(
        &mut self,
        packet: &GamePacket,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<EventResult, HandlerError> {
        let GamePacket::RequestNetworkSettings(request) = packet else {
            return Ok(EventResult::Continue);
        };
        expect_state(ctx, LoginState::AwaitingNetworkSettings, "RequestNetworkSettings")?;

        if !is_supported_version(request.protocol_version) {
            return Ok(reject_version(ctx, request.protocol_version));
        }

        ctx.login.protocol_version = Some(request.protocol_version);
        ctx.send(self.settings.clone());
        ctx.enable_compression();
        ctx.login.state = LoginState::AwaitingLogin;
        info!(
            "Sent NetworkSettings to {} ({:?}, threshold {})",
            ctx.addr, self.settings.compression_algorithm, self.settings.compression_threshold
        );
        Ok(EventResult::Continue)
    }
}

struct LoginHandler {
    encryption: bool,
}

impl PacketHandler for LoginHandler {
    fn handle(
        &mut self,
        packet: &GamePacket,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<EventResult, HandlerError> {
        let GamePacket::Login(login) = packet else {
            return Ok(EventResult::Continue);
        };
        expect_state(ctx, LoginState::AwaitingLogin, "Login")?;

        if !is_supported_version(login.protocol_version) {
            return Ok(reject_version(ctx, login.protocol_version));
        }
        if ctx.login.protocol_version != Some(login.protocol_version) {
            debug!(
                "{} logged in with protocol {} after requesting {:?}",
                ctx.addr, login.protocol_version, ctx.login.protocol_version
            );
        }

        let identity = match extract_identity(&login.chain) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Rejecting login from {}: {e}", ctx.addr);
                ctx.kick("Invalid login data");
                return Ok(EventResult::Cancelled);
            }
        };
        info!(
            "Login from {}: {} (XUID: {}, UUID: {})",
            ctx.addr, identity.display_name, identity.xuid, identity.identity
        );

        if self.encryption {
            let start = match begin_handshake(&identity.identity_public_key) {
                Ok(start) => start,
                Err(e) => {
                    warn!("Encryption handshake with {} failed: {e}", ctx.addr);
                    ctx.kick("Encryption handshake failed");
                    return Ok(EventResult::Cancelled);
                }
            };
            ctx.send(ServerToClientHandshake { jwt: start.jwt });
            ctx.enable_encryption(start.encryption);
            ctx.login.state = LoginState::AwaitingHandshake;
        } else {
            ctx.send(PlayStatus::new(PlayStatusType::LoginSuccess));
            ctx.login.state = LoginState::LoggedIn;
        }
        ctx.login.identity = Some(identity);
        Ok(EventResult::Continue)
    }
}

struct HandshakeHandler;

impl PacketHandler for HandshakeHandler {
    fn handle(
        &mut self,
        _packet: &GamePacket,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<EventResult, HandlerError> {
        expect_state(ctx, LoginState::AwaitingHandshake, "ClientToServerHandshake")?;
        ctx.send(PlayStatus::new(PlayStatusType::LoginSuccess));
        ctx.login.state = LoginState::LoggedIn;
        info!("Encrypted session established with {}", ctx.addr);
        Ok(EventResult::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bedrock_proto::packets::{ClientToServerHandshake, Login, RequestNetworkSettings};

    use super::*;
    use crate::session::{LoginProgress, SessionAction};

    fn addr() -> SocketAddr {
        "10.0.0.3:40000".parse().unwrap()
    }

    fn dispatcher(encryption: bool) -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        register(
            &mut dispatcher,
            &NegotiationSettings {
                compression: CompressionAlgorithm::Snappy,
                compression_threshold: 1,
                encryption,
            },
        );
        dispatcher
    }

    fn run(
        dispatcher: &mut Dispatcher,
        login: &mut LoginProgress,
        packet: impl Into<GamePacket>,
    ) -> Vec<SessionAction> {
        let mut ctx = HandlerContext::new(addr(), login);
        dispatcher.dispatch(&packet.into(), &mut ctx);
        ctx.into_actions()
    }

    #[test]
    fn network_settings_then_compression() {
        let mut d = dispatcher(true);
        let mut login = LoginProgress::default();
        let actions = run(
            &mut d,
            &mut login,
            RequestNetworkSettings {
                protocol_version: PROTOCOL_VERSION,
            },
        );
        assert_eq!(actions.len(), 2);
        let SessionAction::Send(GamePacket::NetworkSettings(settings)) = &actions[0] else {
            panic!("expected NetworkSettings first");
        };
        assert_eq!(settings.compression_algorithm, CompressionAlgorithm::Snappy);
        assert_eq!(settings.compression_threshold, 1);
        assert!(matches!(actions[1], SessionAction::EnableCompression));
        assert_eq!(login.state, LoginState::AwaitingLogin);
        assert_eq!(login.protocol_version, Some(PROTOCOL_VERSION));
    }

    #[test]
    fn old_client_gets_failed_client() {
        let mut d = dispatcher(true);
        let mut login = LoginProgress::default();
        let actions = run(
            &mut d,
            &mut login,
            RequestNetworkSettings {
                protocol_version: 766,
            },
        );
        assert!(matches!(
            &actions[0],
            SessionAction::Send(GamePacket::PlayStatus(PlayStatus {
                status: PlayStatusType::FailedClient
            }))
        ));
        assert!(matches!(&actions[1], SessionAction::Disconnect(r) if r == "Outdated client"));
        assert_eq!(login.state, LoginState::AwaitingNetworkSettings);
    }

    #[test]
    fn newer_client_gets_failed_server() {
        let mut d = dispatcher(true);
        let mut login = LoginProgress::default();
        let actions = run(
            &mut d,
            &mut login,
            RequestNetworkSettings {
                protocol_version: PROTOCOL_VERSION + 1,
            },
        );
        assert!(matches!(
            &actions[0],
            SessionAction::Send(GamePacket::PlayStatus(PlayStatus {
                status: PlayStatusType::FailedServer
            }))
        ));
    }

    #[test]
    fn login_before_settings_is_ignored() {
        let mut d = dispatcher(false);
        let mut login = LoginProgress::default();
        let actions = run(
            &mut d,
            &mut login,
            Login {
                protocol_version: PROTOCOL_VERSION,
                chain: vec![],
                client_data_jwt: String::new(),
            },
        );
        assert!(actions.is_empty());
        assert_eq!(login.state, LoginState::AwaitingNetworkSettings);
    }

    #[test]
    fn bad_chain_is_kicked() {
        let mut d = dispatcher(false);
        let mut login = LoginProgress {
            state: LoginState::AwaitingLogin,
            ..LoginProgress::default()
        };
        let actions = run(
            &mut d,
            &mut login,
            Login {
                protocol_version: PROTOCOL_VERSION,
                chain: vec!["not.a.jwt".into()],
                client_data_jwt: String::new(),
            },
        );
        assert!(matches!(
            &actions[0],
            SessionAction::Send(GamePacket::Disconnect(_))
        ));
        assert!(matches!(&actions[1], SessionAction::Disconnect(r) if r == "Invalid login data"));
    }

    #[test]
    fn stray_handshake_is_ignored() {
        let mut d = dispatcher(true);
        let mut login = LoginProgress {
            state: LoginState::AwaitingLogin,
            ..LoginProgress::default()
        };
        assert!(run(&mut d, &mut login, ClientToServerHandshake).is_empty());
        assert_eq!(login.state, LoginState::AwaitingLogin);
    }
}
