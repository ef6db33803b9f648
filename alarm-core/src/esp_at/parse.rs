//! `winnow` parsers for the ESP-AT response and notification lines we consume.

use core::net::Ipv4Addr;

use winnow::ModalResult;
use winnow::ascii::dec_uint;
use winnow::combinator::{delimited, preceded};
use winnow::prelude::*;
use winnow::token::{literal, take, take_till};

use crate::network::HardwareAddress;

/// `+CWSTATE` value meaning "connected and has an IPv4 address".
pub const CWSTATE_GOT_IP: u8 = 2;

/// Payload delivered by `+MQTTSUBRECV`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubscriptionMessage<'a> {
    pub link_id: u8,
    pub topic: &'a [u8],
    pub payload: &'a [u8],
}

/// Final result line terminating a command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FinalResult {
    Ok,
    Error,
    Fail,
}

/// Recognises `OK`, `ERROR`, `SEND FAIL`, and `FAIL`.
#[must_use]
pub fn final_result(line: &[u8]) -> Option<FinalResult> {
    match line {
        b"OK" | b"SEND OK" => Some(FinalResult::Ok),
        b"ERROR" | b"SEND FAIL" => Some(FinalResult::Error),
        b"FAIL" => Some(FinalResult::Fail),
        _ => None,
    }
}

fn quoted<'a>(input: &mut &'a [u8]) -> ModalResult<&'a [u8]> {
    delimited(b'"', take_till(0.., b'"'), b'"').parse_next(input)
}

fn ipv4(input: &mut &[u8]) -> ModalResult<Ipv4Addr> {
    (dec_uint, b'.', dec_uint, b'.', dec_uint, b'.', dec_uint)
        .map(|(a, _, b, _, c, _, d)| Ipv4Addr::new(a, b, c, d))
        .parse_next(input)
}

fn hex_byte(input: &mut &[u8]) -> ModalResult<u8> {
    take(2_usize)
        .verify_map(|pair: &[u8]| {
            let text = core::str::from_utf8(pair).ok()?;
            if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u8::from_str_radix(text, 16).ok()
        })
        .parse_next(input)
}

fn mac(input: &mut &[u8]) -> ModalResult<HardwareAddress> {
    (
        hex_byte, b':', hex_byte, b':', hex_byte, b':', hex_byte, b':', hex_byte, b':', hex_byte,
    )
        .map(|(a, _, b, _, c, _, d, _, e, _, f)| [a, b, c, d, e, f])
        .parse_next(input)
}

fn cwstate_line(input: &mut &[u8]) -> ModalResult<u8> {
    preceded(literal(b"+CWSTATE:"), dec_uint).parse_next(input)
}

fn cipsta_ip_line(input: &mut &[u8]) -> ModalResult<Ipv4Addr> {
    preceded(literal(b"+CIPSTA:ip:"), delimited(b'"', ipv4, b'"')).parse_next(input)
}

fn cipstamac_line(input: &mut &[u8]) -> ModalResult<HardwareAddress> {
    preceded(literal(b"+CIPSTAMAC:"), delimited(b'"', mac, b'"')).parse_next(input)
}

fn subrecv_header<'a>(input: &mut &'a [u8]) -> ModalResult<(u8, &'a [u8], usize)> {
    (
        preceded(literal(b"+MQTTSUBRECV:"), dec_uint),
        preceded(b',', quoted),
        delimited(b',', dec_uint, b','),
    )
        .parse_next(input)
}

fn subrecv_line<'a>(input: &mut &'a [u8]) -> ModalResult<SubscriptionMessage<'a>> {
    let (link_id, topic, len) = subrecv_header(input)?;
    let payload = take(len).parse_next(input)?;
    Ok(SubscriptionMessage {
        link_id,
        topic,
        payload,
    })
}

fn link_notice(prefix: &'static [u8], mut line: &[u8]) -> Option<u8> {
    let parsed: ModalResult<u8> = preceded(literal(prefix), dec_uint).parse_next(&mut line);
    parsed.ok()
}

/// Parses `+CWSTATE:<state>,"<ssid>"`.
#[must_use]
pub fn cwstate(mut line: &[u8]) -> Option<u8> {
    cwstate_line(&mut line).ok()
}

/// Parses `+CIPSTA:ip:"a.b.c.d"`.
#[must_use]
pub fn station_ip(mut line: &[u8]) -> Option<Ipv4Addr> {
    cipsta_ip_line(&mut line).ok()
}

/// Parses `+CIPSTAMAC:"aa:bb:cc:dd:ee:ff"`.
#[must_use]
pub fn station_mac(mut line: &[u8]) -> Option<HardwareAddress> {
    cipstamac_line(&mut line).ok()
}

/// Parses `+MQTTSUBRECV:<link>,"<topic>",<len>,<data>`.
#[must_use]
pub fn subscription_message(mut line: &[u8]) -> Option<SubscriptionMessage<'_>> {
    subrecv_line(&mut line).ok()
}

/// Header of a `+MQTTSUBRECV` line plus however much payload has arrived.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubscriptionPrefix<'a> {
    pub link_id: u8,
    pub topic: &'a [u8],
    /// Payload length announced by the module.
    pub declared_len: usize,
    pub payload: &'a [u8],
}

impl SubscriptionPrefix<'_> {
    /// Announced payload bytes not yet seen.
    #[must_use]
    pub fn bytes_missing(&self) -> usize {
        self.declared_len.saturating_sub(self.payload.len())
    }
}

/// Parses the header of a possibly incomplete `+MQTTSUBRECV` line.
#[must_use]
pub fn subscription_prefix(mut line: &[u8]) -> Option<SubscriptionPrefix<'_>> {
    let (link_id, topic, declared_len) = subrecv_header(&mut line).ok()?;
    Some(SubscriptionPrefix {
        link_id,
        topic,
        declared_len,
        payload: line,
    })
}

/// Bytes still missing from a `+MQTTSUBRECV` line whose payload spans a line break.
#[must_use]
pub fn subscription_bytes_missing(line: &[u8]) -> Option<usize> {
    let missing = subscription_prefix(line)?.bytes_missing();
    (missing > 0).then_some(missing)
}

/// Parses `+MQTTDISCONNECTED:<link>`.
#[must_use]
pub fn mqtt_disconnected(line: &[u8]) -> Option<u8> {
    link_notice(b"+MQTTDISCONNECTED:", line)
}

/// Parses `+MQTTCONNECTED:<link>,...`.
#[must_use]
pub fn mqtt_connected(line: &[u8]) -> Option<u8> {
    link_notice(b"+MQTTCONNECTED:", line)
}
