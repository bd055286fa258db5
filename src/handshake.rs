//! Session bootstrap.
//!
//! The client opens with a session-id-0 frame holding its credentials.
//! The server authenticates it and answers either with a regular frame
//! (the session is up) or with a bare error record. Neither direction is
//! sequenced yet; delivery starts with the server's accepting reply.

use crate::mux::{ErrorReply, MuxMessage, MuxOutput};
use crate::protocol::{Protocol, ProtocolConfig, ProtocolError};
use crate::transcoder::Transcoder;
use crate::wire;

/// Error code sent when the opening message cannot be parsed.
const CODE_MALFORMED: u32 = 500;

/// The server's verdict on a connection attempt.
pub enum ServerHandshake {
    Accepted {
        protocol: Box<Protocol>,
        /// First frame to return to the client.
        reply: Vec<u8>,
        /// Application data that rode along on the opening message.
        output: MuxOutput,
    },
    Rejected {
        /// Error frame to return to the client before dropping it.
        reply: Vec<u8>,
        error: ErrorReply,
    },
}

/// Prepares a client session and its opening message.
///
/// `auth` is handed to the server's authentication callback verbatim.
pub fn create_client(
    config: ProtocolConfig,
    transcoder: Box<dyn Transcoder>,
    auth: Option<Vec<u8>>,
) -> Result<(Protocol, Vec<u8>), ProtocolError> {
    let hello = MuxMessage {
        auth: auth.map(serde_bytes::ByteBuf::from),
        ..Default::default()
    };
    let body = transcoder.encode(&hello)?;
    let opening = wire::encode_session_id(0, &body);
    Ok((Protocol::new(config, transcoder), opening))
}

/// Answers a client's opening message.
///
/// `auth_fn` receives the client's credentials (empty when it sent none)
/// and either accepts or names the rejection. Pass
/// [`accept_all`] to skip authentication.
pub fn create_server<F>(
    config: ProtocolConfig,
    transcoder: Box<dyn Transcoder>,
    initial_message: &[u8],
    auth_fn: F,
) -> Result<ServerHandshake, ProtocolError>
where
    F: FnOnce(&[u8]) -> Result<(), ErrorReply>,
{
    let ordered = config.ordering.is_some();

    let mut body: &[u8] = &[];
    let mut error: Option<ErrorReply> = None;
    match wire::decode_session_id(initial_message) {
        Ok((_session_id, rest)) => match transcoder.decode(rest) {
            Ok(hello) => {
                body = rest;
                let credentials = hello
                    .auth
                    .map(serde_bytes::ByteBuf::into_vec)
                    .unwrap_or_default();
                if let Err(reply) = auth_fn(&credentials) {
                    error = Some(reply);
                }
            }
            Err(_) => {
                error = Some(ErrorReply {
                    code: CODE_MALFORMED,
                    reason: String::new(),
                });
            }
        },
        Err(_) => {
            error = Some(ErrorReply {
                code: CODE_MALFORMED,
                reason: String::new(),
            });
        }
    }

    if let Some(error) = error {
        let record = MuxMessage {
            code: Some(error.code),
            reason: if error.reason.is_empty() {
                None
            } else {
                Some(error.reason.clone())
            },
            ..Default::default()
        };
        let mut reply = transcoder.encode(&record)?;
        if ordered {
            reply = wire::encode_seq_ack(0, &[], &reply)?;
        }
        return Ok(ServerHandshake::Rejected { reply, error });
    }

    let mut protocol = Protocol::new(config, transcoder);
    let output = protocol.receive_unsequenced(body)?;
    let reply = protocol.send()?;
    Ok(ServerHandshake::Accepted {
        protocol: Box::new(protocol),
        reply,
        output,
    })
}

/// An authentication callback that admits every client.
pub fn accept_all(_credentials: &[u8]) -> Result<(), ErrorReply> {
    Ok(())
}
