//! TLS record layer and hello metadata.

use super::cursor::Cursor;
use crate::domain::{tls_content_types, Protocol, TlsRecord};
use crate::error::DecodeError;

const RECORD_HEADER_LEN: usize = 5;
/// Largest legal record: 2^14 plaintext plus expansion.
const MAX_RECORD_LEN: usize = (1 << 14) + 2048;

const HANDSHAKE_CLIENT_HELLO: u8 = 1;
const HANDSHAKE_SERVER_HELLO: u8 = 2;

const EXT_SERVER_NAME: u16 = 0;
const EXT_SUPPORTED_VERSIONS: u16 = 43;

fn is_content_type(byte: u8) -> bool {
    (tls_content_types::CHANGE_CIPHER_SPEC..=tls_content_types::HEARTBEAT).contains(&byte)
}

/// Whether the payload opens with a plausible TLS record header.
pub(super) fn looks_like_tls(data: &[u8]) -> bool {
    data.len() >= RECORD_HEADER_LEN && is_content_type(data[0]) && data[1] == 3 && data[2] <= 4
}

pub(super) fn parse(data: &[u8]) -> Result<TlsRecord, DecodeError> {
    if !looks_like_tls(data) {
        return Err(DecodeError::Unrecognized(Protocol::Tls));
    }

    let mut c = Cursor::new(data, Protocol::Tls);
    let content_type = c.u8()?;
    let version = c.u16()?;
    let length = c.u16()?;
    if length as usize > MAX_RECORD_LEN {
        return Err(DecodeError::invalid(
            Protocol::Tls,
            format!("record length {} exceeds {}", length, MAX_RECORD_LEN),
        ));
    }

    let mut record = TlsRecord {
        content_type,
        version,
        length,
        handshake_type: None,
        handshake_version: None,
        server_name: None,
        record_count: count_records(data),
    };

    if content_type == tls_content_types::HANDSHAKE {
        let end = (RECORD_HEADER_LEN + length as usize).min(data.len());
        let fragment = &data[RECORD_HEADER_LEN..end];
        if let Some(&handshake_type) = fragment.first() {
            record.handshake_type = Some(handshake_type);
            // The hello may continue in a later segment; keep what parsed
            let _ = read_hello(fragment, &mut record);
        }
    }

    Ok(record)
}

/// Records whose header lies in the segment, stopping at the first
/// implausible header.
fn count_records(data: &[u8]) -> usize {
    let mut pos = 0;
    let mut count = 0;
    while pos + RECORD_HEADER_LEN <= data.len() && is_content_type(data[pos]) {
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        count += 1;
        pos += RECORD_HEADER_LEN + length;
    }
    count
}

fn read_hello(fragment: &[u8], record: &mut TlsRecord) -> Result<(), DecodeError> {
    let mut c = Cursor::new(fragment, Protocol::Tls);
    let handshake_type = c.u8()?;
    if handshake_type != HANDSHAKE_CLIENT_HELLO && handshake_type != HANDSHAKE_SERVER_HELLO {
        return Ok(());
    }
    let _length = c.u24()?;
    record.handshake_version = Some(c.u16()?);
    c.skip(32)?; // random

    let session_id_len = c.u8()? as usize;
    c.skip(session_id_len)?;

    if handshake_type == HANDSHAKE_CLIENT_HELLO {
        let suites_len = c.u16()? as usize;
        c.skip(suites_len)?;
        let compression_len = c.u8()? as usize;
        c.skip(compression_len)?;
    } else {
        c.skip(2)?; // cipher suite
        c.skip(1)?; // compression method
    }

    let extensions_len = c.u16()? as usize;
    let extensions = c.take(extensions_len.min(c.remaining()))?;
    let mut ext = Cursor::new(extensions, Protocol::Tls);

    while ext.remaining() >= 4 {
        let ext_type = ext.u16()?;
        let ext_len = ext.u16()? as usize;
        let body = ext.take(ext_len)?;
        match ext_type {
            EXT_SERVER_NAME if handshake_type == HANDSHAKE_CLIENT_HELLO => {
                record.server_name = read_server_name(body)?;
            }
            EXT_SUPPORTED_VERSIONS if handshake_type == HANDSHAKE_SERVER_HELLO && body.len() == 2 => {
                record.handshake_version = Some(u16::from_be_bytes([body[0], body[1]]));
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_server_name(body: &[u8]) -> Result<Option<String>, DecodeError> {
    let mut c = Cursor::new(body, Protocol::Tls);
    let list_len = c.u16()? as usize;
    let list = c.take(list_len.min(c.remaining()))?;
    let mut entries = Cursor::new(list, Protocol::Tls);
    while entries.remaining() >= 3 {
        let name_type = entries.u8()?;
        let name_len = entries.u16()? as usize;
        let name = entries.take(name_len)?;
        if name_type == 0 {
            return Ok(Some(String::from_utf8_lossy(name).into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A TLS 1.2 record carrying a ClientHello with an SNI extension.
    pub(crate) fn client_hello(server_name: &str) -> Vec<u8> {
        let name = server_name.as_bytes();
        let mut sni = Vec::new();
        sni.extend(((name.len() + 3) as u16).to_be_bytes());
        sni.push(0);
        sni.extend((name.len() as u16).to_be_bytes());
        sni.extend(name);

        let mut extensions = Vec::new();
        extensions.extend(EXT_SERVER_NAME.to_be_bytes());
        extensions.extend((sni.len() as u16).to_be_bytes());
        extensions.extend(sni);

        let mut hello = Vec::new();
        hello.extend([0x03, 0x03]);
        hello.extend([0u8; 32]);
        hello.push(0); // session id
        hello.extend([0x00, 0x02, 0x13, 0x01]); // one cipher suite
        hello.extend([0x01, 0x00]); // null compression
        hello.extend((extensions.len() as u16).to_be_bytes());
        hello.extend(extensions);

        let mut handshake = vec![HANDSHAKE_CLIENT_HELLO];
        handshake.extend(&(hello.len() as u32).to_be_bytes()[1..]);
        handshake.extend(hello);

        let mut record = vec![tls_content_types::HANDSHAKE, 0x03, 0x01];
        record.extend((handshake.len() as u16).to_be_bytes());
        record.extend(handshake);
        record
    }

    #[test]
    fn test_client_hello_sni() {
        let data = client_hello("example.org");
        let record = parse(&data).unwrap();
        assert_eq!(record.handshake_type, Some(HANDSHAKE_CLIENT_HELLO));
        assert_eq!(record.handshake_version, Some(0x0303));
        assert_eq!(record.server_name.as_deref(), Some("example.org"));
        assert_eq!(record.record_count, 1);
    }

    /// A ServerHello negotiating TLS 1.3 through supported_versions, with
    /// the legacy 1.2 version in the hello body.
    fn server_hello_tls13() -> Vec<u8> {
        let mut extensions = Vec::new();
        extensions.extend(EXT_SUPPORTED_VERSIONS.to_be_bytes());
        extensions.extend(2u16.to_be_bytes());
        extensions.extend([0x03, 0x04]);

        let mut hello = Vec::new();
        hello.extend([0x03, 0x03]);
        hello.extend([0x11u8; 32]);
        hello.push(0); // session id
        hello.extend([0x13, 0x01]); // cipher suite
        hello.push(0); // compression
        hello.extend((extensions.len() as u16).to_be_bytes());
        hello.extend(extensions);

        let mut handshake = vec![HANDSHAKE_SERVER_HELLO];
        handshake.extend(&(hello.len() as u32).to_be_bytes()[1..]);
        handshake.extend(hello);

        let mut record = vec![tls_content_types::HANDSHAKE, 0x03, 0x03];
        record.extend((handshake.len() as u16).to_be_bytes());
        record.extend(handshake);
        record
    }

    #[test]
    fn test_server_hello_supported_versions() {
        let record = parse(&server_hello_tls13()).unwrap();
        assert_eq!(record.handshake_type, Some(HANDSHAKE_SERVER_HELLO));
        assert_eq!(record.version, 0x0303);
        assert_eq!(record.handshake_version, Some(0x0304));
        assert_eq!(record.server_name, None);
    }

    #[test]
    fn test_cut_hello_keeps_header() {
        let data = client_hello("example.org");
        let record = parse(&data[..20]).unwrap();
        assert_eq!(record.handshake_type, Some(HANDSHAKE_CLIENT_HELLO));
        assert_eq!(record.server_name, None);
    }

    #[test]
    fn test_application_data_records_are_counted() {
        let mut data = vec![23, 3, 3, 0, 2, 0xaa, 0xbb];
        data.extend([23, 3, 3, 0, 1, 0xcc]);
        let record = parse(&data).unwrap();
        assert_eq!(record.content_type, tls_content_types::APPLICATION_DATA);
        assert_eq!(record.record_count, 2);
        assert_eq!(record.handshake_type, None);
    }

    #[test]
    fn test_oversized_record_is_invalid() {
        let data = [23, 3, 3, 0xff, 0xff, 0];
        assert!(matches!(parse(&data), Err(DecodeError::Invalid { .. })));
    }

    #[test]
    fn test_non_tls_is_unrecognized() {
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\n"),
            Err(DecodeError::Unrecognized(Protocol::Tls))
        );
    }
}
