use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;

#[derive(Debug, Error)]
pub enum WakeError {
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
    #[error("failed to send magic packet: {0}")]
    Io(#[from] std::io::Error),
}

pub fn parse_mac(raw: &str) -> Result<[u8; 6], WakeError> {
    let hex: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WakeError::InvalidMac(raw.to_string()));
    }

    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| WakeError::InvalidMac(raw.to_string()))?;
    }
    Ok(mac)
}

/// Six `0xFF` bytes followed by the MAC sixteen times.
pub fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    packet
}

pub async fn send_magic_packet(mac: &str) -> Result<(), WakeError> {
    let packet = magic_packet(parse_mac(mac)?);
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(&packet, SocketAddr::from((Ipv4Addr::BROADCAST, 9)))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_mac_notations() {
        let expected = [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E];
        assert_eq!(parse_mac("00:1A:2B:3C:4D:5E").unwrap(), expected);
        assert_eq!(parse_mac("00-1a-2b-3c-4d-5e").unwrap(), expected);
        assert_eq!(parse_mac("001a.2b3c.4d5e").unwrap(), expected);
        assert_eq!(parse_mac("001A2B3C4D5E").unwrap(), expected);
        assert!(parse_mac("00:1A:2B").is_err());
        assert!(parse_mac("zz:1A:2B:3C:4D:5E").is_err());
    }

    #[test]
    fn packet_layout() {
        let mac = [1, 2, 3, 4, 5, 6];
        let packet = magic_packet(mac);
        assert_eq!(&packet[..6], &[0xFF; 6]);
        assert!(packet[6..].chunks(6).all(|c| c == mac));
    }
}
