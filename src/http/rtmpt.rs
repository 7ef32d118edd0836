//! RTMPT command paths
//!
//! Tunneled RTMP arrives as HTTP POSTs whose paths name the command, the
//! client id, and a request index, all positional:
//!
//! ```text
//! POST /open/1
//! POST /idle/<client>/<index>
//! POST /send/<client>/<index>     body carries raw RTMP bytes
//! POST /close/<client>
//! ```

use crate::error::HttpError;

/// A parsed tunnel command path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmptCommand {
    /// Allocate a client id; replies with the id in the body
    Open,
    /// Poll for buffered server-to-client bytes
    Idle { client: u64, index: u32 },
    /// Deliver client-to-server RTMP bytes
    Send { client: u64, index: u32 },
    /// Tear the tunnel down
    Close { client: u64 },
}

impl RtmptCommand {
    pub fn parse(path: &str) -> Result<RtmptCommand, HttpError> {
        let bad = || HttpError::BadRtmptPath(path.to_string());
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let command = segments.next().ok_or_else(bad)?;

        match command {
            "open" => Ok(RtmptCommand::Open),
            "idle" | "send" => {
                let client = segments
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(bad)?;
                let index = segments
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(bad)?;
                if command == "idle" {
                    Ok(RtmptCommand::Idle { client, index })
                } else {
                    Ok(RtmptCommand::Send { client, index })
                }
            }
            "close" => {
                let client = segments
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(bad)?;
                Ok(RtmptCommand::Close { client })
            }
            _ => Err(bad()),
        }
    }

    /// Whether a path looks like a tunnel command at all
    pub fn is_tunnel_path(path: &str) -> bool {
        matches!(
            path.split('/').find(|s| !s.is_empty()),
            Some("open" | "idle" | "send" | "close")
        )
    }
}
