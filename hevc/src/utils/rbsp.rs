//! Emulation-prevention removal.
//!
//! NAL payloads escape any `00 00 0x` run by inserting `0x03` after the two
//! zero bytes. [`Rbsp::extract`] reverses this and remembers where each
//! removed byte sat, so byte positions in the RBSP can be mapped back to the
//! original NAL unit.

/// Raw byte sequence payload of one NAL unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rbsp {
    data: Vec<u8>,
    /// RBSP index of the byte that followed each removed `0x03`.
    epb_positions: Vec<usize>,
}

impl Rbsp {
    /// Copies `payload` while dropping every `0x03` that follows two zero bytes.
    pub fn extract(payload: &[u8]) -> Self {
        let mut data = Vec::with_capacity(payload.len());
        let mut epb_positions = Vec::new();
        let mut zeros = 0;

        for &byte in payload {
            if zeros >= 2 && byte == 0x03 {
                epb_positions.push(data.len());
                zeros = 0;
                continue;
            }

            zeros = if byte == 0 { zeros + 1 } else { 0 };
            data.push(byte);
        }

        Self {
            data,
            epb_positions,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of emulation-prevention bytes removed in total.
    pub fn emulation_prevention_bytes(&self) -> usize {
        self.epb_positions.len()
    }

    /// Number of emulation-prevention bytes located before RBSP byte `pos`.
    pub fn emulation_prevention_bytes_before(&self, pos: usize) -> usize {
        self.epb_positions.partition_point(|&p| p <= pos)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Rbsp {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Inserts emulation-prevention bytes, producing a NAL payload.
#[cfg(test)]
pub(crate) fn escape(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 2);
    let mut zeros = 0;

    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }

    out
}

#[test]
fn removes_emulation_prevention() {
    let payload = [
        0x42, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x03, 0x7F,
    ];
    let rbsp = Rbsp::extract(&payload);

    assert_eq!(
        rbsp.as_ref(),
        [0x42, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x7F]
    );
    assert_eq!(rbsp.emulation_prevention_bytes(), 3);
    assert_eq!(rbsp.emulation_prevention_bytes_before(2), 0);
    assert_eq!(rbsp.emulation_prevention_bytes_before(3), 1);
    assert_eq!(rbsp.emulation_prevention_bytes_before(6), 2);
    assert_eq!(rbsp.emulation_prevention_bytes_before(rbsp.len()), 3);
}

#[test]
fn lone_three_is_kept() {
    let rbsp = Rbsp::extract(&[0x00, 0x03, 0x00, 0x11, 0x03]);
    assert_eq!(rbsp.as_ref(), [0x00, 0x03, 0x00, 0x11, 0x03]);
    assert_eq!(rbsp.emulation_prevention_bytes(), 0);
}

#[test]
fn escape_then_extract() {
    let rbsp = [0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x02, 0x80];
    let escaped = escape(&rbsp);
    assert_eq!(
        escaped,
        [0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02, 0x80]
    );
    assert_eq!(Rbsp::extract(&escaped).as_ref(), rbsp);
}
