use nom::bytes::complete::{tag, take};
use nom::combinator::map;
use nom::number::complete::u8 as take_u8;
use nom::IResult;

use super::{checksum, BROADCAST_DEVICE_ID, CMD_DT1, CMD_RQ1, FRAME_END, FRAME_START, MANUFACTURER_ROLAND, MODEL_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// Universal Non-Realtime Identity Reply.
    IdentityReply {
        device_id: u8,
        software_rev_1: u8,
        software_rev_3: u8,
    },
    /// A DT1 (data set) frame, either our own outbound write or the
    /// device's echo/notification of one.
    DataSet { device_id: u8, address: [u8; 4], body: Vec<u8> },
    /// Structurally valid SysEx we have no specific interest in (e.g. an
    /// RQ1 echo, or traffic from another manufacturer).
    Other,
    /// Failed a structural check: missing sentinels, wrong length, wrong
    /// manufacturer/model for what was otherwise expected.
    Malformed,
}

/// Builds a DT1 (write) frame. `override_checksum` lets the caller ship a
/// verbatim checksum byte instead of the computed one, needed for one known
/// device quirk during the editor-mode handshake (see the handshake module).
pub fn build_dt(device_id: u8, address: [u8; 4], body: &[u8], override_checksum: Option<u8>) -> Vec<u8> {
    build_frame(device_id, CMD_DT1, &address, body, override_checksum)
}

/// Builds an RQ1 (read request) frame; `body` is the big-endian 4-byte
/// length of the region being requested.
pub fn build_rq(device_id: u8, address: [u8; 4], length: [u8; 4], override_checksum: Option<u8>) -> Vec<u8> {
    build_frame(device_id, CMD_RQ1, &address, &length, override_checksum)
}

fn build_frame(device_id: u8, command: u8, address: &[u8; 4], body: &[u8], override_checksum: Option<u8>) -> Vec<u8> {
    let mut addr_body = Vec::with_capacity(address.len() + body.len());
    addr_body.extend_from_slice(address);
    addr_body.extend_from_slice(body);
    let cksum = override_checksum.unwrap_or_else(|| checksum(&addr_body));

    let mut frame = Vec::with_capacity(8 + addr_body.len() + 2);
    frame.push(FRAME_START);
    frame.push(MANUFACTURER_ROLAND);
    frame.push(device_id);
    frame.extend_from_slice(&MODEL_ID);
    frame.push(command);
    frame.extend_from_slice(&addr_body);
    frame.push(cksum);
    frame.push(FRAME_END);
    frame
}

/// Broadcast Universal Non-Realtime Identity Request.
pub fn identity_request() -> Vec<u8> {
    vec![FRAME_START, 0x7E, BROADCAST_DEVICE_ID, 0x06, 0x01, FRAME_END]
}

/// Parses one complete SysEx frame (including the `F0`/`F7` sentinels).
pub fn parse(frame: &[u8]) -> ParsedFrame {
    match parse_identity_reply(frame) {
        Ok((_, pf)) => return pf,
        Err(_) => {}
    }
    match parse_dataset(frame) {
        Ok((_, pf)) => return pf,
        Err(_) => {}
    }
    if frame.first() == Some(&FRAME_START) && frame.last() == Some(&FRAME_END) {
        ParsedFrame::Other
    } else {
        ParsedFrame::Malformed
    }
}

fn parse_identity_reply(input: &[u8]) -> IResult<&[u8], ParsedFrame> {
    let (input, _) = tag([FRAME_START])(input)?;
    let (input, _) = tag([0x7E])(input)?;
    let (input, device_id) = take_u8(input)?;
    let (input, _) = tag([0x06, 0x02, MANUFACTURER_ROLAND, 0x4F, 0x03, 0x00, 0x00])(input)?;
    let (input, software_rev_1) = take_u8(input)?;
    let (input, _) = tag([0x00])(input)?;
    let (input, software_rev_3) = take_u8(input)?;
    let (input, _) = tag([0x00])(input)?;
    let (input, _) = tag([FRAME_END])(input)?;
    Ok((
        input,
        ParsedFrame::IdentityReply {
            device_id,
            software_rev_1,
            software_rev_3,
        },
    ))
}

fn parse_dataset(input: &[u8]) -> IResult<&[u8], ParsedFrame> {
    let (input, _) = tag([FRAME_START])(input)?;
    let (input, _) = tag([MANUFACTURER_ROLAND])(input)?;
    let (input, device_id) = take_u8(input)?;
    let (input, _) = tag(MODEL_ID)(input)?;
    let (input, _) = tag([CMD_DT1])(input)?;
    let (input, address) = map(take(4usize), |s: &[u8]| [s[0], s[1], s[2], s[3]])(input)?;
    // Whatever remains, minus the trailing checksum byte and frame-end
    // sentinel, is the body; its length is not known ahead of parsing.
    if input.len() < 2 {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)));
    }
    let body_len = input.len() - 2;
    let (input, body) = take(body_len)(input)?;
    let (input, _cksum) = take_u8(input)?;
    let (input, _) = tag([FRAME_END])(input)?;
    Ok((
        input,
        ParsedFrame::DataSet {
            device_id,
            address,
            body: body.to_vec(),
        },
    ))
}
