//! Coefficient scan-order conversions for quantization matrices.
//!
//! Scaling lists are transmitted in up-right diagonal order, while many
//! consumers want raster or zigzag order. 16x16 and 32x32 lists are coded as
//! 8x8 matrices that are upsampled, so their conversions are the 8x8 ones.

/// Raster position of each zigzag index in a 4x4 block.
pub const ZIGZAG_4X4: [u8; 16] = [0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15];

/// Raster position of each zigzag index in an 8x8 block.
pub const ZIGZAG_8X8: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Raster position of each up-right diagonal index in a 4x4 block.
pub const UPRIGHT_DIAGONAL_4X4: [u8; 16] = up_right_diagonal::<16>(4);

/// Raster position of each up-right diagonal index in an 8x8 block.
pub const UPRIGHT_DIAGONAL_8X8: [u8; 64] = up_right_diagonal::<64>(8);

// 6.5.3: walk anti-diagonals from bottom-left to top-right.
const fn up_right_diagonal<const N: usize>(blk_size: isize) -> [u8; N] {
    let mut scan = [0u8; N];
    let mut i = 0;
    let mut x: isize = 0;
    let mut y: isize = 0;

    while i < N {
        while y >= 0 {
            if x < blk_size && y < blk_size {
                scan[i] = (y * blk_size + x) as u8;
                i += 1;
            }
            y -= 1;
            x += 1;
        }
        y = x;
        x = 0;
    }

    scan
}

#[inline(always)]
fn to_raster<const N: usize>(scanned: &[u8; N], order: &[u8; N]) -> [u8; N] {
    let mut raster = [0u8; N];
    for (&value, &pos) in scanned.iter().zip(order) {
        raster[pos as usize] = value;
    }
    raster
}

#[inline(always)]
fn from_raster<const N: usize>(raster: &[u8; N], order: &[u8; N]) -> [u8; N] {
    (*order).map(|pos| raster[pos as usize])
}

pub fn zigzag_from_raster_4x4(raster: &[u8; 16]) -> [u8; 16] {
    from_raster(raster, &ZIGZAG_4X4)
}

pub fn raster_from_zigzag_4x4(zigzag: &[u8; 16]) -> [u8; 16] {
    to_raster(zigzag, &ZIGZAG_4X4)
}

pub fn zigzag_from_raster_8x8(raster: &[u8; 64]) -> [u8; 64] {
    from_raster(raster, &ZIGZAG_8X8)
}

pub fn raster_from_zigzag_8x8(zigzag: &[u8; 64]) -> [u8; 64] {
    to_raster(zigzag, &ZIGZAG_8X8)
}

pub fn upright_diagonal_from_raster_4x4(raster: &[u8; 16]) -> [u8; 16] {
    from_raster(raster, &UPRIGHT_DIAGONAL_4X4)
}

pub fn raster_from_upright_diagonal_4x4(diagonal: &[u8; 16]) -> [u8; 16] {
    to_raster(diagonal, &UPRIGHT_DIAGONAL_4X4)
}

pub fn upright_diagonal_from_raster_8x8(raster: &[u8; 64]) -> [u8; 64] {
    from_raster(raster, &UPRIGHT_DIAGONAL_8X8)
}

pub fn raster_from_upright_diagonal_8x8(diagonal: &[u8; 64]) -> [u8; 64] {
    to_raster(diagonal, &UPRIGHT_DIAGONAL_8X8)
}

pub use raster_from_upright_diagonal_8x8 as raster_from_upright_diagonal_16x16;
pub use raster_from_upright_diagonal_8x8 as raster_from_upright_diagonal_32x32;
pub use raster_from_zigzag_8x8 as raster_from_zigzag_16x16;
pub use raster_from_zigzag_8x8 as raster_from_zigzag_32x32;
pub use upright_diagonal_from_raster_8x8 as upright_diagonal_from_raster_16x16;
pub use upright_diagonal_from_raster_8x8 as upright_diagonal_from_raster_32x32;
pub use zigzag_from_raster_8x8 as zigzag_from_raster_16x16;
pub use zigzag_from_raster_8x8 as zigzag_from_raster_32x32;

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp<const N: usize>() -> [u8; N] {
        std::array::from_fn(|i| (i * 3 + 1) as u8)
    }

    #[test]
    fn diagonal_tables() {
        assert_eq!(
            UPRIGHT_DIAGONAL_4X4,
            [0, 4, 1, 8, 5, 2, 12, 9, 6, 3, 13, 10, 7, 14, 11, 15]
        );
        assert_eq!(&UPRIGHT_DIAGONAL_8X8[..10], &[0, 8, 1, 16, 9, 2, 24, 17, 10, 3]);
        assert_eq!(UPRIGHT_DIAGONAL_8X8[63], 63);
    }

    #[test]
    fn tables_are_permutations() {
        fn check<const N: usize>(table: &[u8; N]) {
            let mut seen = [false; N];
            for &pos in table {
                assert!(!seen[pos as usize], "{pos} repeated");
                seen[pos as usize] = true;
            }
        }

        check(&ZIGZAG_4X4);
        check(&ZIGZAG_8X8);
        check(&UPRIGHT_DIAGONAL_4X4);
        check(&UPRIGHT_DIAGONAL_8X8);
    }

    #[test]
    fn conversions_invert() {
        let m4 = ramp::<16>();
        let m8 = ramp::<64>();

        assert_eq!(raster_from_zigzag_4x4(&zigzag_from_raster_4x4(&m4)), m4);
        assert_eq!(zigzag_from_raster_4x4(&raster_from_zigzag_4x4(&m4)), m4);
        assert_eq!(raster_from_zigzag_8x8(&zigzag_from_raster_8x8(&m8)), m8);
        assert_eq!(zigzag_from_raster_8x8(&raster_from_zigzag_8x8(&m8)), m8);

        assert_eq!(
            raster_from_upright_diagonal_4x4(&upright_diagonal_from_raster_4x4(&m4)),
            m4
        );
        assert_eq!(
            upright_diagonal_from_raster_4x4(&raster_from_upright_diagonal_4x4(&m4)),
            m4
        );
        assert_eq!(
            raster_from_upright_diagonal_32x32(&upright_diagonal_from_raster_32x32(&m8)),
            m8
        );
        assert_eq!(
            upright_diagonal_from_raster_16x16(&raster_from_upright_diagonal_16x16(&m8)),
            m8
        );
    }

    #[test]
    fn diagonal_to_raster_positions() {
        // the third coded coefficient lands at row 0, column 1
        let mut coded = [0u8; 16];
        coded[2] = 99;
        let raster = raster_from_upright_diagonal_4x4(&coded);
        assert_eq!(raster[1], 99);

        let zigzag = zigzag_from_raster_4x4(&raster);
        assert_eq!(zigzag[1], 99);
    }
}
