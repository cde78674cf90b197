//! Shared mock transports for the scenario tests
//!
//! `ScriptedTransport` replays an exact request/response script and fails
//! loudly on any deviation, which keeps the byte-level expectations
//! honest. `FnTransport` wraps a closure for device behavior that has to
//! be computed (mutual auth, key agreement).

use std::collections::VecDeque;

use async_trait::async_trait;
use piv_client::Transport;

pub struct ScriptedTransport {
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
        }
    }

    /// Queue one exchange: the exact request we expect, and the response
    /// (payload plus status word) to hand back.
    pub fn expect(mut self, request: Vec<u8>, response: Vec<u8>) -> Self {
        self.script.push_back((request, response));
        self
    }

    #[allow(dead_code)]
    pub fn is_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        let (expected, response) = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected exchange: {}", hex::encode(request)));
        assert_eq!(
            hex::encode(request),
            hex::encode(&expected),
            "request did not match the script"
        );
        Ok(response)
    }
}

/// Closure-backed transport for exchanges that must be computed.
#[allow(dead_code)]
pub struct FnTransport<F>(pub F);

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: FnMut(&[u8]) -> Vec<u8> + Send,
{
    async fn exchange(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok((self.0)(request))
    }
}

/// SELECT request for the PIV AID, as `Session::open` emits it.
pub fn select_request() -> Vec<u8> {
    let mut req = vec![0x00, 0xA4, 0x04, 0x00, 0x0B];
    req.extend_from_slice(&[0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00]);
    req.push(0x00);
    req
}

pub fn version_request() -> Vec<u8> {
    vec![0x00, 0xFD, 0x00, 0x00, 0x00]
}

pub fn mgm_metadata_request() -> Vec<u8> {
    vec![0x00, 0xF7, 0x00, 0x9B, 0x00]
}

/// The exchanges of `Session::open` against a device whose metadata
/// instruction answers `6D00`: select, version, and — only when the
/// reported version is at least 5.3, which is when the session probes at
/// all — the management-key metadata request.
pub fn open_preamble(script: ScriptedTransport, version: [u8; 3]) -> ScriptedTransport {
    let mut version_resp = version.to_vec();
    version_resp.extend_from_slice(&[0x90, 0x00]);
    let script = script
        .expect(select_request(), vec![0x90, 0x00])
        .expect(version_request(), version_resp);
    if (version[0], version[1]) >= (5, 3) {
        script.expect(mgm_metadata_request(), vec![0x6D, 0x00])
    } else {
        script
    }
}

pub fn sw(sw: u16) -> Vec<u8> {
    vec![(sw >> 8) as u8, sw as u8]
}

pub fn with_sw(mut payload: Vec<u8>, status: u16) -> Vec<u8> {
    payload.extend_from_slice(&sw(status));
    payload
}
