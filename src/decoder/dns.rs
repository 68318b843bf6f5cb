//! DNS message parsing (RFC 1035), shared by UDP, TCP and mDNS.

use std::net::{Ipv4Addr, Ipv6Addr};

use super::cursor::Cursor;
use crate::domain::{DnsMessage, DnsQuestion, DnsResourceRecord, Protocol};
use crate::error::DecodeError;

const HEADER_LEN: usize = 12;
const MAX_POINTER_JUMPS: usize = 16;
const MAX_NAME_LEN: usize = 255;

const TYPE_A: u16 = 1;
const TYPE_NS: u16 = 2;
const TYPE_CNAME: u16 = 5;
const TYPE_PTR: u16 = 12;
const TYPE_MX: u16 = 15;
const TYPE_TXT: u16 = 16;
const TYPE_AAAA: u16 = 28;

/// Parse a complete DNS message.
pub(super) fn parse(data: &[u8]) -> Result<DnsMessage, DecodeError> {
    parse_counted(data).map(|(message, _)| message)
}

/// Accept `data` as DNS only when it is unambiguous: one standard query
/// or response that accounts for every byte.
pub(super) fn sniff(data: &[u8]) -> Option<DnsMessage> {
    let (message, consumed) = parse_counted(data).ok()?;
    let plausible = message.questions.len() == 1 && message.opcode == 0 && consumed == data.len();
    plausible.then_some(message)
}

fn parse_counted(data: &[u8]) -> Result<(DnsMessage, usize), DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            layer: Protocol::Dns,
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }

    let mut c = Cursor::new(data, Protocol::Dns);
    let id = c.u16()?;
    let flags = c.u16()?;
    let question_count = c.u16()?;
    let answer_count = c.u16()?;
    let authority_count = c.u16()?;
    let additional_count = c.u16()?;

    let mut questions = Vec::with_capacity(question_count.min(32) as usize);
    for _ in 0..question_count {
        let name = read_name(data, &mut c)?;
        questions.push(DnsQuestion {
            name,
            record_type: c.u16()?,
            class: c.u16()?,
        });
    }

    let mut answers = Vec::with_capacity(answer_count.min(32) as usize);
    for _ in 0..answer_count {
        answers.push(read_record(data, &mut c)?);
    }

    // Authority and additional sections are validated but not kept
    for _ in 0..(authority_count as usize + additional_count as usize) {
        read_record(data, &mut c)?;
    }

    let message = DnsMessage {
        id,
        is_response: flags & 0x8000 != 0,
        opcode: ((flags >> 11) & 0x0F) as u8,
        authoritative: flags & 0x0400 != 0,
        truncated: flags & 0x0200 != 0,
        recursion_desired: flags & 0x0100 != 0,
        recursion_available: flags & 0x0080 != 0,
        rcode: (flags & 0x000F) as u8,
        questions,
        answers,
        authority_count,
        additional_count,
    };
    Ok((message, c.position()))
}

fn read_record<'m>(message: &'m [u8], c: &mut Cursor<'m>) -> Result<DnsResourceRecord, DecodeError> {
    let name = read_name(message, c)?;
    let record_type = c.u16()?;
    let class = c.u16()?;
    let ttl = c.u32()?;
    let rdlength = c.u16()? as usize;
    let rdata_start = c.position();
    let rdata = c.take(rdlength)?;

    let data = match (record_type, rdata.len()) {
        (TYPE_A, 4) => Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string(),
        (TYPE_AAAA, 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ipv6Addr::from(octets).to_string()
        }
        (TYPE_A | TYPE_AAAA, n) => {
            return Err(DecodeError::invalid(
                Protocol::Dns,
                format!("address record of {} bytes", n),
            ))
        }
        (TYPE_CNAME | TYPE_NS | TYPE_PTR, _) => {
            read_name(message, &mut Cursor::at(message, rdata_start, Protocol::Dns))?
        }
        (TYPE_MX, n) if n >= 3 => {
            let mut rc = Cursor::at(message, rdata_start, Protocol::Dns);
            let preference = rc.u16()?;
            format!("{} {}", preference, read_name(message, &mut rc)?)
        }
        (TYPE_TXT, _) => read_txt(rdata)?,
        (_, n) => format!("{} bytes", n),
    };

    Ok(DnsResourceRecord {
        name,
        record_type,
        class,
        ttl,
        data,
    })
}

fn read_txt(rdata: &[u8]) -> Result<String, DecodeError> {
    let mut c = Cursor::new(rdata, Protocol::Dns);
    let mut parts = Vec::new();
    while c.remaining() > 0 {
        let len = c.u8()? as usize;
        parts.push(format!("\"{}\"", String::from_utf8_lossy(c.take(len)?)));
    }
    Ok(parts.join(" "))
}

/// Read a possibly compressed name at the cursor, leaving the cursor after
/// the name as stored in place.
fn read_name<'m>(message: &'m [u8], c: &mut Cursor<'m>) -> Result<String, DecodeError> {
    let mut labels: Vec<String> = Vec::new();
    let mut name_len = 0;
    let mut jumps = 0;
    // Reader over the message used after the first pointer jump
    let mut followed: Option<Cursor<'m>> = None;

    loop {
        let reader = match followed.as_mut() {
            Some(f) => f,
            None => &mut *c,
        };
        let len = reader.u8()?;
        match len & 0xC0 {
            0x00 => {
                if len == 0 {
                    break;
                }
                let label = reader.take(len as usize)?;
                name_len += label.len() + 1;
                if name_len > MAX_NAME_LEN {
                    return Err(DecodeError::invalid(Protocol::Dns, "name longer than 255 bytes"));
                }
                labels.push(String::from_utf8_lossy(label).into_owned());
            }
            0xC0 => {
                let low = reader.u8()?;
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(DecodeError::invalid(Protocol::Dns, "compression loop"));
                }
                let target = (((len & 0x3F) as usize) << 8) | low as usize;
                if target >= message.len() {
                    return Err(DecodeError::invalid(
                        Protocol::Dns,
                        format!("compression pointer {} out of range", target),
                    ));
                }
                followed = Some(Cursor::at(message, target, Protocol::Dns));
            }
            other => {
                return Err(DecodeError::invalid(
                    Protocol::Dns,
                    format!("label type 0x{:02x}", other),
                ))
            }
        }
    }

    if labels.is_empty() {
        return Ok("<Root>".to_string());
    }
    Ok(labels.join("."))
}
