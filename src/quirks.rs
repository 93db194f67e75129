//! Version-gated layout behaviour.
//!
//! Bundle layout details changed across engine releases without a format
//! version bump, so the loader keys them off the revision string embedded in
//! the header.  Everything version-dependent is decided once here and carried
//! through load and save as a [`QuirkProfile`].

use serde::Serialize;

use crate::header::{FLAG_BLOCK_INFO_NEED_PADDING_AT_START, FLAG_UNITY_CN_ENCRYPTION, UnityVersion};

/// Which meaning the 0x200/0x400 archive flag bits carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlagLayout {
    /// Releases up to 2020.3.34 / 2021.3.2 / 2022.3.1: bit 0x200 marks the
    /// encrypted variant and no pre-block padding exists.
    Legacy,
    /// Later releases: bit 0x400 marks the encrypted variant and bit 0x200
    /// requests 16-byte padding before the block data.
    Modern,
}

/// How the loader treats the bytes right after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderAlignment {
    /// Format version 7 and later always align.
    Always,
    /// 2019.4 bundles may or may not be padded; align only if the padding
    /// bytes are all zero.
    Probe,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuirkProfile {
    pub flag_layout: FlagLayout,
    pub header_alignment: HeaderAlignment,
}

impl QuirkProfile {
    pub fn select(format_version: u32, unity: UnityVersion) -> Self {
        let legacy = unity.major < 2020
            || (unity.major == 2020 && unity.minor == 3 && unity.patch <= 34)
            || (unity.major == 2021 && unity.minor == 3 && unity.patch <= 2)
            || (unity.major == 2022 && unity.minor == 3 && unity.patch <= 1);
        let flag_layout = if legacy { FlagLayout::Legacy } else { FlagLayout::Modern };

        let header_alignment = if format_version >= 7 {
            HeaderAlignment::Always
        } else if unity.major == 2019 && unity.minor == 4 {
            HeaderAlignment::Probe
        } else {
            HeaderAlignment::Never
        };

        Self { flag_layout, header_alignment }
    }

    /// Archive flag bit marking the encrypted variant under this layout.
    pub fn encryption_mask(&self) -> u32 {
        match self.flag_layout {
            FlagLayout::Legacy => FLAG_BLOCK_INFO_NEED_PADDING_AT_START,
            FlagLayout::Modern => FLAG_UNITY_CN_ENCRYPTION,
        }
    }

    pub fn requires_key(&self, flags: u32) -> bool {
        flags & self.encryption_mask() != 0
    }

    /// Whether the block data is preceded by a 16-byte alignment step.
    pub fn pads_block_data(&self, flags: u32) -> bool {
        self.flag_layout == FlagLayout::Modern && flags & FLAG_BLOCK_INFO_NEED_PADDING_AT_START != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(revision: &str) -> FlagLayout {
        QuirkProfile::select(7, UnityVersion::parse(revision)).flag_layout
    }

    #[test]
    fn legacy_cutoffs() {
        assert_eq!(layout("5.6.7f1"), FlagLayout::Legacy);
        assert_eq!(layout("2019.4.40f1"), FlagLayout::Legacy);
        assert_eq!(layout("2020.3.34f1"), FlagLayout::Legacy);
        assert_eq!(layout("2020.3.35f1"), FlagLayout::Modern);
        assert_eq!(layout("2021.3.2f1"), FlagLayout::Legacy);
        assert_eq!(layout("2021.3.3f1"), FlagLayout::Modern);
        assert_eq!(layout("2022.3.1f1"), FlagLayout::Legacy);
        assert_eq!(layout("2022.3.2f1"), FlagLayout::Modern);
        assert_eq!(layout("2023.1.0f1"), FlagLayout::Modern);
    }

    #[test]
    fn non_lts_minors_of_gated_majors_are_modern() {
        assert_eq!(layout("2020.1.0f1"), FlagLayout::Modern);
        assert_eq!(layout("2021.2.19f1"), FlagLayout::Modern);
    }

    #[test]
    fn header_alignment_rules() {
        let v = UnityVersion::parse("2019.4.1f1");
        assert_eq!(QuirkProfile::select(7, v).header_alignment, HeaderAlignment::Always);
        assert_eq!(QuirkProfile::select(6, v).header_alignment, HeaderAlignment::Probe);
        let v = UnityVersion::parse("2019.3.1f1");
        assert_eq!(QuirkProfile::select(6, v).header_alignment, HeaderAlignment::Never);
    }

    #[test]
    fn flag_meaning_depends_on_layout() {
        let legacy = QuirkProfile::select(6, UnityVersion::new(2018, 4, 0));
        assert!(legacy.requires_key(0x200));
        assert!(!legacy.requires_key(0x400));
        assert!(!legacy.pads_block_data(0x200));

        let modern = QuirkProfile::select(8, UnityVersion::new(2022, 3, 10));
        assert!(modern.requires_key(0x400));
        assert!(!modern.requires_key(0x200));
        assert!(modern.pads_block_data(0x240));
        assert!(!modern.pads_block_data(0x40));
    }
}
