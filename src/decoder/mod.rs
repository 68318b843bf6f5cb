//! Layered protocol decoding.
//!
//! Each layer decoder takes the bytes left by the layer below and returns a
//! `Step`: the decoded layer, the bytes it leaves for the next one, and
//! what the next layer should be decoded as. A `Step` without `next` ends
//! the chain. Decoding never fails; problems become `Malformed` or
//! `Unknown` layers.

mod application;
mod cursor;
mod dns;
mod http;
mod link;
mod network;
mod packet_decoder;
mod tls;
mod transport;

pub use packet_decoder::ProtocolDecoder;

pub(crate) struct Step<'a, L, N> {
    pub layer: L,
    pub payload: &'a [u8],
    pub next: Option<N>,
}

impl<'a, L, N> Step<'a, L, N> {
    /// The chain ends at this layer.
    pub fn stop(layer: L, payload: &'a [u8]) -> Self {
        Self {
            layer,
            payload,
            next: None,
        }
    }

    pub fn next(layer: L, payload: &'a [u8], next: N) -> Self {
        Self {
            layer,
            payload,
            next: Some(next),
        }
    }
}
