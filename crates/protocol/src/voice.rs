//! Voice-Protokoll (RTP ueber UDP)
//!
//! Binaere Paketstruktur der Telefonie-Seite. Die Nutzdaten sind rohe
//! G.711-Bytes, ein Byte entspricht einem Sample bei 8 kHz.
//!
//! ## Paketformat (Header = 12 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version 2, kein Padding/Extension/CSRC -> 0x80
//!  1       1   Payload-Typ (0 = PCMU, 8 = PCMA)
//!  2       2   Sequenznummer (big-endian, wrap bei 2^16)
//!  4       4   Zeitstempel in Samples (big-endian, wrap bei 2^32)
//!  8       4   SSRC (big-endian)
//! 12+      N   Nutzdaten
//! ```

use serde::{Deserialize, Serialize};

use crate::realtime::AudioFormat;

/// Erstes Header-Byte: Version 2, P=0, X=0, CC=0
pub const VERSION_BYTE: u8 = 0x80;

/// Header-Groesse in Bytes
pub const HEADER_GROESSE: usize = 12;

/// Nutzdaten eines Frames: 20 ms G.711 bei 8 kHz mono
pub const FRAME_GROESSE: usize = 160;

/// Standard-SSRC, falls keine konfiguriert ist
pub const STANDARD_SSRC: u32 = 0x1234_5678;

// ---------------------------------------------------------------------------
// PayloadTyp
// ---------------------------------------------------------------------------

/// Unterstuetzte G.711-Varianten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PayloadTyp {
    /// G.711 μ-law
    Pcmu = 0,
    /// G.711 A-law
    Pcma = 8,
}

impl PayloadTyp {
    /// Konvertiert die Payload-Typ-Nummer aus dem Header
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte & 0x7F {
            0 => Some(Self::Pcmu),
            8 => Some(Self::Pcma),
            _ => None,
        }
    }

    /// Codec-Name wie im SDP (`PCMU` / `PCMA`)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pcmu => "PCMU",
            Self::Pcma => "PCMA",
        }
    }

    /// Byte-Wert fuer ein stilles Sample
    pub fn stille_byte(&self) -> u8 {
        match self {
            Self::Pcmu => 0xFF,
            Self::Pcma => 0xD5,
        }
    }

    /// Passendes Audioformat der Realtime-API
    pub fn audio_format(&self) -> AudioFormat {
        match self {
            Self::Pcmu => AudioFormat::G711Ulaw,
            Self::Pcma => AudioFormat::G711Alaw,
        }
    }
}

impl Default for PayloadTyp {
    fn default() -> Self {
        Self::Pcmu
    }
}

// ---------------------------------------------------------------------------
// RtpHeader
// ---------------------------------------------------------------------------

/// 12-Byte RTP-Header
///
/// Direkte Byte-Serialisierung, kein serde (Hot Path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Payload-Typ (7 Bit)
    pub payload_typ: u8,
    /// Sequenznummer
    pub sequence: u16,
    /// Zeitstempel in Samples
    pub timestamp: u32,
    /// Synchronisation Source
    pub ssrc: u32,
}

impl RtpHeader {
    /// Header-Groesse in Bytes
    pub const SIZE: usize = HEADER_GROESSE;

    /// Erstellt einen neuen Header
    pub fn new(payload_typ: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            payload_typ: payload_typ & 0x7F,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serialisiert den Header (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = VERSION_BYTE;
        buf[1] = self.payload_typ & 0x7F;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Liest einen Header aus einem Byte-Slice
    ///
    /// Gibt `None` zurueck wenn das Slice kuerzer als 12 Bytes ist.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            payload_typ: buf[1] & 0x7F,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

// ---------------------------------------------------------------------------
// Bauen / Parsen
// ---------------------------------------------------------------------------

/// Baut ein vollstaendiges Paket (Header + Nutzdaten)
pub fn paket_bauen(
    payload_typ: u8,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    payload: &[u8],
) -> Vec<u8> {
    let header = RtpHeader::new(payload_typ, sequence, timestamp, ssrc);
    let mut buf = Vec::with_capacity(HEADER_GROESSE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Liest Zeitstempel und Nutzdaten aus einem Paket
///
/// Pakete mit hoechstens 12 Bytes (nur Header oder kuerzer) sind ungueltig
/// und liefern `None`. Das ist kein Fehlerfall, der Aufrufer verwirft sie.
pub fn paket_parsen(buf: &[u8]) -> Option<(u32, &[u8])> {
    if buf.len() <= HEADER_GROESSE {
        return None;
    }
    let header = RtpHeader::decode(buf)?;
    Some((header.timestamp, &buf[HEADER_GROESSE..]))
}

// ---------------------------------------------------------------------------
// RtpFramer
// ---------------------------------------------------------------------------

/// Sende-Zaehler einer Richtung
///
/// Jedes gebaute Paket erhoeht die Sequenznummer um 1 (mod 2^16) und den
/// Zeitstempel um die Nutzdatenlaenge (mod 2^32), unabhaengig von der Uhr.
#[derive(Debug, Clone)]
pub struct RtpFramer {
    payload_typ: PayloadTyp,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpFramer {
    /// Erstellt einen Framer, der bei Sequenz 0 / Zeitstempel 0 beginnt
    pub fn neu(payload_typ: PayloadTyp, ssrc: u32) -> Self {
        Self::mit_start(payload_typ, ssrc, 0, 0)
    }

    /// Erstellt einen Framer mit vorgegebenen Startwerten
    pub fn mit_start(payload_typ: PayloadTyp, ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        Self {
            payload_typ,
            ssrc,
            sequence,
            timestamp,
        }
    }

    /// Baut das naechste Paket und schaltet die Zaehler weiter
    pub fn bauen(&mut self, payload: &[u8]) -> Vec<u8> {
        let paket = paket_bauen(
            self.payload_typ as u8,
            self.sequence,
            self.timestamp,
            self.ssrc,
            payload,
        );
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(payload.len() as u32);
        paket
    }

    /// Sequenznummer des naechsten Pakets
    pub fn naechste_sequence(&self) -> u16 {
        self.sequence
    }

    /// Zeitstempel des naechsten Pakets
    pub fn naechster_timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_typ(&self) -> PayloadTyp {
        self.payload_typ
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_ist_12_bytes() {
        let header = RtpHeader::new(0, 0, 0, 0);
        assert_eq!(header.encode().len(), 12);
    }

    #[test]
    fn header_big_endian_byte_reihenfolge() {
        let bytes = RtpHeader::new(8, 0x0102, 0x03040506, 0x0708090A).encode();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..4], &[0x01, 0x02]);
        assert_eq!(&bytes[4..8], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&bytes[8..12], &[0x07, 0x08, 0x09, 0x0A]);
    }

    #[test]
    fn bauen_und_parsen_liefert_original() {
        let payload = vec![0x7F; 160];
        let paket = paket_bauen(0, 4242, 0xDEAD_BEEF, STANDARD_SSRC, &payload);
        let (ts, nutzdaten) = paket_parsen(&paket).expect("Paket muss gueltig sein");
        assert_eq!(ts, 0xDEAD_BEEF);
        assert_eq!(nutzdaten, &payload[..]);
    }

    #[test]
    fn parsen_verwirft_kurze_pakete() {
        assert!(paket_parsen(&[0u8; 5]).is_none());
        assert!(paket_parsen(&[]).is_none());
        // Nur Header ohne Nutzdaten
        let nur_header = RtpHeader::new(0, 1, 2, 3).encode();
        assert!(paket_parsen(&nur_header).is_none());
    }

    #[test]
    fn parsen_ab_13_bytes() {
        let paket = paket_bauen(0, 0, 77, 1, &[9]);
        assert_eq!(paket.len(), 13);
        assert_eq!(paket_parsen(&paket), Some((77, &[9u8][..])));
    }

    #[test]
    fn framer_sequence_wrap_around() {
        let mut framer = RtpFramer::neu(PayloadTyp::Pcmu, STANDARD_SSRC);
        for _ in 0..65536u32 {
            framer.bauen(&[0xFF]);
        }
        let paket = framer.bauen(&[0xFF]);
        let header = RtpHeader::decode(&paket).unwrap();
        assert_eq!(header.sequence, 0);
    }

    #[test]
    fn framer_timestamp_waechst_um_nutzdatenlaenge() {
        let mut framer = RtpFramer::mit_start(PayloadTyp::Pcmu, 1, 10, 1000);
        let p1 = framer.bauen(&[0u8; 160]);
        let p2 = framer.bauen(&[0u8; 90]);
        let p3 = framer.bauen(&[0u8; 10]);

        assert_eq!(RtpHeader::decode(&p1).unwrap().timestamp, 1000);
        assert_eq!(RtpHeader::decode(&p2).unwrap().timestamp, 1160);
        assert_eq!(RtpHeader::decode(&p3).unwrap().timestamp, 1250);
        assert_eq!(RtpHeader::decode(&p3).unwrap().sequence, 12);
    }

    #[test]
    fn framer_timestamp_wrap_around() {
        let mut framer = RtpFramer::mit_start(PayloadTyp::Pcmu, 1, 0, u32::MAX - 10);
        framer.bauen(&[0u8; 160]);
        assert_eq!(framer.naechster_timestamp(), 149);
    }

    #[test]
    fn framer_setzt_payload_typ_und_ssrc() {
        let mut framer = RtpFramer::neu(PayloadTyp::Pcma, 0xCAFE);
        let header = RtpHeader::decode(&framer.bauen(&[1, 2, 3])).unwrap();
        assert_eq!(header.payload_typ, 8);
        assert_eq!(header.ssrc, 0xCAFE);
    }

    #[test]
    fn payload_typ_zuordnung() {
        assert_eq!(PayloadTyp::from_u8(0), Some(PayloadTyp::Pcmu));
        assert_eq!(PayloadTyp::from_u8(8), Some(PayloadTyp::Pcma));
        assert_eq!(PayloadTyp::from_u8(96), None);
        assert_eq!(PayloadTyp::Pcmu.stille_byte(), 0xFF);
        assert_eq!(PayloadTyp::Pcma.audio_format(), AudioFormat::G711Alaw);
    }
}
