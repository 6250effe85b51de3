// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

macro_rules! box_database {
    ($($(#[$attr:meta])* $boxenum:ident $boxtype:expr),*,) => {
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub enum BoxType {
            $($(#[$attr])* $boxenum),*,
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                use self::BoxType::*;
                match t {
                    $($(#[$attr])* $boxtype => $boxenum),*,
                    _ => UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(b: BoxType) -> u32 {
                use self::BoxType::*;
                match b {
                    $($(#[$attr])* $boxenum => $boxtype),*,
                    UnknownBox(t) => t,
                }
            }
        }
    }
}

/// Four-character code of a box or brand.
#[derive(Default, PartialEq, Eq, Clone, Copy)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl From<u32> for FourCC {
    fn from(number: u32) -> Self {
        Self { value: number.to_be_bytes() }
    }
}

impl From<BoxType> for FourCC {
    fn from(t: BoxType) -> Self {
        let box_num: u32 = Into::into(t);
        From::from(box_num)
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self { value }
    }
}

impl From<FourCC> for BoxType {
    fn from(fourcc: FourCC) -> Self {
        Self::from(u32::from_be_bytes(fourcc.value))
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        self.value.eq(*other)
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.value) {
            Ok(s) => f.write_str(s),
            Err(_) => fmt::Debug::fmt(&self.value, f),
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Debug for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fourcc: FourCC = From::from(*self);
        fmt::Debug::fmt(&fourcc, f)
    }
}

box_database!(
    FileTypeBox                       0x6674_7970, // "ftyp"
    MediaDataBox                      0x6d64_6174, // "mdat"
    FreeSpaceBox                      0x6672_6565, // "free"
    SkipBox                           0x736b_6970, // "skip"
    UuidBox                           0x7575_6964, // "uuid"
    MetadataBox                       0x6d65_7461, // "meta"
    HandlerBox                        0x6864_6c72, // "hdlr"
    PrimaryItemBox                    0x7069_746d, // "pitm"
    ItemLocationBox                   0x696c_6f63, // "iloc"
    ItemInfoBox                       0x6969_6e66, // "iinf"
    ItemInfoEntry                     0x696e_6665, // "infe"
    ItemReferenceBox                  0x6972_6566, // "iref"
    ItemDataBox                       0x6964_6174, // "idat"
    ItemPropertiesBox                 0x6970_7270, // "iprp"
    ItemPropertyContainerBox          0x6970_636f, // "ipco"
    ItemPropertyAssociationBox        0x6970_6d61, // "ipma"
    ImageSpatialExtentsBox            0x6973_7065, // "ispe"
    PixelInformationBox               0x7069_7869, // "pixi"
    AV1CodecConfigurationBox          0x6176_3143, // "av1C"
    ColourInformationBox              0x636f_6c72, // "colr"
    AuxiliaryTypeProperty             0x6175_7843, // "auxC"
    CleanApertureBox                  0x636c_6170, // "clap"
    ImageRotation                     0x6972_6f74, // "irot"
    ImageMirror                       0x696d_6972, // "imir"
    PixelAspectRatioBox               0x7061_7370, // "pasp"
    ContentLightLevelBox              0x636c_6c69, // "clli"
    MasteringDisplayColourVolumeBox   0x6d64_6376, // "mdcv"
    GroupsListBox                     0x6772_706c, // "grpl"
    MovieBox                          0x6d6f_6f76, // "moov"
    MovieHeaderBox                    0x6d76_6864, // "mvhd"
    TrackBox                          0x7472_616b, // "trak"
    TrackHeaderBox                    0x746b_6864, // "tkhd"
    MediaBox                          0x6d64_6961, // "mdia"
    MediaHeaderBox                    0x6d64_6864, // "mdhd"
    MediaInformationBox               0x6d69_6e66, // "minf"
    SampleTableBox                    0x7374_626c, // "stbl"
    SampleDescriptionBox              0x7374_7364, // "stsd"
    AV1SampleEntry                    0x6176_3031, // "av01"
    TimeToSampleBox                   0x7374_7473, // "stts"
    SampleToChunkBox                  0x7374_7363, // "stsc"
    SampleSizeBox                     0x7374_737a, // "stsz"
    ChunkOffsetBox                    0x7374_636f, // "stco"
    ChunkLargeOffsetBox               0x636f_3634, // "co64"
);

impl BoxType {
    /// Boxes whose payload is nothing but child boxes.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::MovieBox
                | Self::TrackBox
                | Self::MediaBox
                | Self::MediaInformationBox
                | Self::SampleTableBox
                | Self::ItemPropertiesBox
                | Self::ItemPropertyContainerBox
        )
    }
}

#[test]
fn fourcc_round_trip() {
    assert_eq!(BoxType::from(u32::from_be_bytes(*b"ftyp")), BoxType::FileTypeBox);
    assert_eq!(FourCC::from(BoxType::AV1CodecConfigurationBox), b"av1C");
    assert_eq!(BoxType::from(FourCC::from(*b"wxyz")), BoxType::UnknownBox(0x7778_797a));
    assert_eq!(format!("{:?}", BoxType::ItemPropertyAssociationBox), "ipma");
}
