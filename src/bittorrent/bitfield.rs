use std::fmt;

/// Bitfield 可以理解成一个二进制 bit 数组，数组值为1 ，就代表有这个块，0代表没有
/// 每个字节内从高位开始计数
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    pub fn new(bytes: Vec<u8>) -> Self {
        Bitfield(bytes)
    }

    /// 超出字节容量的索引一律返回false
    pub fn has_piece(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;
        match self.0.get(byte_index) {
            Some(&byte) => byte >> (7 - offset) & 1 != 0,
            None => false,
        }
    }

    /// 设置piece，越界时什么也不做
    pub fn set_piece(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;
        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - offset);
        }
    }

    /// 可以表示的piece数量
    pub fn capacity(&self) -> u32 {
        (self.0.len() * 8) as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece#")?;
        for index in (0..self.capacity()).filter(|i| self.has_piece(*i)) {
            write!(f, " {}", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod bitfield_test {
    use super::Bitfield;

    #[test]
    fn test_has_piece() {
        let bitfield = Bitfield::new(vec![0b0101_0100, 0b0101_0100]);
        let expected = [
            false, true, false, true, false, true, false, false, false, true, false, true, false,
            true, false, false,
        ];
        for (index, has) in expected.iter().enumerate() {
            assert_eq!(bitfield.has_piece(index as u32), *has);
        }
        assert!(!bitfield.has_piece(16));
        assert!(!bitfield.has_piece(u32::MAX));
    }

    #[test]
    fn test_set_piece_only_touches_one_bit() {
        for index in 0..16 {
            let mut bitfield = Bitfield::new(vec![0b0101_0100, 0b0101_0100]);
            let before = bitfield.clone();
            bitfield.set_piece(index);
            assert!(bitfield.has_piece(index));
            for other in (0..16).filter(|i| *i != index) {
                assert_eq!(bitfield.has_piece(other), before.has_piece(other));
            }
        }
    }

    #[test]
    fn test_set_piece_out_of_range() {
        let mut bitfield = Bitfield::new(vec![0b0101_0100, 0b0101_0100]);
        bitfield.set_piece(16);
        bitfield.set_piece(1000);
        assert_eq!(bitfield.as_bytes(), &[0b0101_0100, 0b0101_0100]);
    }

    #[test]
    fn test_display() {
        let bitfield = Bitfield::new(vec![0b1000_0001]);
        assert_eq!(bitfield.to_string(), "piece# 0 7");
    }
}
