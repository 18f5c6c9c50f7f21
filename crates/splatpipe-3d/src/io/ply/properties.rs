use super::PlyError;

/// Byte order of the binary payload.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PlyEncoding {
    /// `format binary_little_endian 1.0`
    BinaryLittleEndian,
    /// `format binary_big_endian 1.0`
    BinaryBigEndian,
}

/// A scalar property declared in the header.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// Property name, e.g. `x` or `red`.
    pub name: String,
    /// Declared storage type.
    pub data_type: PlyDataType,
}

/// Scalar storage types of the PLY format.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PlyDataType {
    /// `float`, `float32`
    Float32,
    /// `double`, `float64`
    Float64,
    /// `char`, `int8`
    Int8,
    /// `uchar`, `uint8`
    UInt8,
    /// `short`, `int16`
    Int16,
    /// `ushort`, `uint16`
    UInt16,
    /// `int`, `int32`
    Int32,
    /// `uint`, `uint32`
    UInt32,
}

impl PlyDataType {
    /// Parse a header type name.
    pub fn parse(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(PlyDataType::Float32),
            "double" | "float64" => Ok(PlyDataType::Float64),
            "char" | "int8" => Ok(PlyDataType::Int8),
            "uchar" | "uint8" => Ok(PlyDataType::UInt8),
            "short" | "int16" => Ok(PlyDataType::Int16),
            "ushort" | "uint16" => Ok(PlyDataType::UInt16),
            "int" | "int32" => Ok(PlyDataType::Int32),
            "uint" | "uint32" => Ok(PlyDataType::UInt32),
            _ => Err(PlyError::UnknownPropertyType(type_str.to_string())),
        }
    }

    /// Size in bytes of one value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    fn read(&self, bytes: &[u8], encoding: PlyEncoding) -> f64 {
        macro_rules! decode {
            ($ty:ty) => {{
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                match encoding {
                    PlyEncoding::BinaryLittleEndian => <$ty>::from_le_bytes(raw) as f64,
                    PlyEncoding::BinaryBigEndian => <$ty>::from_be_bytes(raw) as f64,
                }
            }};
        }

        match self {
            PlyDataType::Float32 => decode!(f32),
            PlyDataType::Float64 => decode!(f64),
            PlyDataType::Int8 => decode!(i8),
            PlyDataType::UInt8 => decode!(u8),
            PlyDataType::Int16 => decode!(i16),
            PlyDataType::UInt16 => decode!(u16),
            PlyDataType::Int32 => decode!(i32),
            PlyDataType::UInt32 => decode!(u32),
        }
    }
}

/// Per-vertex accessors shared by the row layouts.
pub trait PlyPropertyTrait {
    /// Vertex position.
    fn to_point(&self) -> [f64; 3];
    /// Vertex color, if the layout carries one.
    fn to_color(&self) -> Option<[u8; 3]>;
    /// Vertex normal, if the layout carries one.
    fn to_normal(&self) -> Option<[f64; 3]>;
}

/// The common `float x, y, z; uchar red, green, blue` vertex row.
#[derive(Debug, bincode::Decode)]
pub struct XYZRgbProperty {
    /// x coordinate
    pub x: f32,
    /// y coordinate
    pub y: f32,
    /// z coordinate
    pub z: f32,
    /// red channel
    pub red: u8,
    /// green channel
    pub green: u8,
    /// blue channel
    pub blue: u8,
}

impl XYZRgbProperty {
    const SIZE: usize = 3 * 4 + 3;
}

impl PlyPropertyTrait for XYZRgbProperty {
    fn to_point(&self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    fn to_color(&self) -> Option<[u8; 3]> {
        Some([self.red, self.green, self.blue])
    }

    fn to_normal(&self) -> Option<[f64; 3]> {
        None
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct FieldSlot {
    offset: usize,
    data_type: PlyDataType,
}

/// Byte offsets of the fields the point cloud table needs, resolved once from the header.
#[derive(Debug, PartialEq, Clone)]
pub struct DynamicLayout {
    row_size: usize,
    position: [FieldSlot; 3],
    color: Option<[FieldSlot; 3]>,
    normal: Option<[FieldSlot; 3]>,
}

impl DynamicLayout {
    fn new(properties: &[PlyPropertyDefinition]) -> Result<Self, PlyError> {
        let mut slots = Vec::with_capacity(properties.len());
        let mut offset = 0;
        for prop in properties {
            slots.push((
                prop.name.as_str(),
                FieldSlot {
                    offset,
                    data_type: prop.data_type,
                },
            ));
            offset += prop.data_type.size();
        }

        let find = |name: &str| slots.iter().find(|(n, _)| *n == name).map(|(_, s)| *s);
        let find3 = |names: [&str; 3]| -> Option<[FieldSlot; 3]> {
            Some([find(names[0])?, find(names[1])?, find(names[2])?])
        };

        let position = [
            find("x").ok_or_else(|| PlyError::MissingPositionProperty("x".to_string()))?,
            find("y").ok_or_else(|| PlyError::MissingPositionProperty("y".to_string()))?,
            find("z").ok_or_else(|| PlyError::MissingPositionProperty("z".to_string()))?,
        ];

        Ok(Self {
            row_size: offset,
            position,
            color: find3(["red", "green", "blue"]).or_else(|| find3(["r", "g", "b"])),
            normal: find3(["nx", "ny", "nz"]),
        })
    }
}

/// A decoded row of a [`DynamicLayout`].
pub struct DynamicRow<'a> {
    bytes: &'a [u8],
    layout: &'a DynamicLayout,
    encoding: PlyEncoding,
}

impl DynamicRow<'_> {
    fn read3(&self, slots: &[FieldSlot; 3]) -> [f64; 3] {
        slots.map(|slot| {
            slot.data_type
                .read(&self.bytes[slot.offset..], self.encoding)
        })
    }
}

impl PlyPropertyTrait for DynamicRow<'_> {
    fn to_point(&self) -> [f64; 3] {
        self.read3(&self.layout.position)
    }

    fn to_color(&self) -> Option<[u8; 3]> {
        let slots = self.layout.color.as_ref()?;
        let color = self.read3(slots);
        Some(std::array::from_fn(|i| match slots[i].data_type {
            PlyDataType::Float32 | PlyDataType::Float64 => (color[i] * 255.0) as u8,
            _ => color[i] as u8,
        }))
    }

    fn to_normal(&self) -> Option<[f64; 3]> {
        self.layout.normal.as_ref().map(|slots| self.read3(slots))
    }
}

/// Row layout of the vertex element.
#[derive(Debug, PartialEq, Clone)]
pub enum PlyType {
    /// Exactly `float x, y, z, uchar red, green, blue`.
    XYZRgb,
    /// Any other layout that carries at least `x`, `y` and `z`.
    Dynamic(DynamicLayout),
}

/// One decoded vertex row.
pub enum PlyProperty<'a> {
    /// Row of the fixed layout.
    XYZRgb(XYZRgbProperty),
    /// Row of a dynamic layout.
    Dynamic(DynamicRow<'a>),
}

impl PlyType {
    /// Pick the row layout for a list of vertex properties.
    pub fn detect_format(properties: &[PlyPropertyDefinition]) -> Result<Self, PlyError> {
        let expected = [
            ("x", PlyDataType::Float32),
            ("y", PlyDataType::Float32),
            ("z", PlyDataType::Float32),
            ("red", PlyDataType::UInt8),
            ("green", PlyDataType::UInt8),
            ("blue", PlyDataType::UInt8),
        ];
        let is_xyz_rgb = properties.len() == expected.len()
            && properties
                .iter()
                .zip(expected.iter())
                .all(|(p, (name, data_type))| p.name == *name && p.data_type == *data_type);

        if is_xyz_rgb {
            return Ok(PlyType::XYZRgb);
        }

        Ok(PlyType::Dynamic(DynamicLayout::new(properties)?))
    }

    /// Size in bytes of one row.
    pub fn size_of(&self) -> usize {
        match self {
            PlyType::XYZRgb => XYZRgbProperty::SIZE,
            PlyType::Dynamic(layout) => layout.row_size,
        }
    }

    /// Whether rows carry a color.
    pub fn has_color(&self) -> bool {
        match self {
            PlyType::XYZRgb => true,
            PlyType::Dynamic(layout) => layout.color.is_some(),
        }
    }

    /// Whether rows carry a normal.
    pub fn has_normal(&self) -> bool {
        match self {
            PlyType::XYZRgb => false,
            PlyType::Dynamic(layout) => layout.normal.is_some(),
        }
    }

    /// Decode one row of `size_of()` bytes.
    pub fn deserialize<'a>(
        &'a self,
        buffer: &'a [u8],
        encoding: PlyEncoding,
    ) -> Result<PlyProperty<'a>, PlyError> {
        if buffer.len() < self.size_of() {
            return Err(PlyError::PayloadTooLarge {
                expected: self.size_of() as u64,
                available: buffer.len() as u64,
            });
        }

        match self {
            PlyType::XYZRgb => {
                let config = bincode::config::standard().with_fixed_int_encoding();
                let (property, _): (XYZRgbProperty, usize) = match encoding {
                    PlyEncoding::BinaryLittleEndian => {
                        bincode::decode_from_slice(buffer, config.with_little_endian())?
                    }
                    PlyEncoding::BinaryBigEndian => {
                        bincode::decode_from_slice(buffer, config.with_big_endian())?
                    }
                };
                Ok(PlyProperty::XYZRgb(property))
            }
            PlyType::Dynamic(layout) => Ok(PlyProperty::Dynamic(DynamicRow {
                bytes: buffer,
                layout,
                encoding,
            })),
        }
    }
}

impl PlyPropertyTrait for PlyProperty<'_> {
    fn to_point(&self) -> [f64; 3] {
        match self {
            PlyProperty::XYZRgb(property) => property.to_point(),
            PlyProperty::Dynamic(property) => property.to_point(),
        }
    }

    fn to_color(&self) -> Option<[u8; 3]> {
        match self {
            PlyProperty::XYZRgb(property) => property.to_color(),
            PlyProperty::Dynamic(property) => property.to_color(),
        }
    }

    fn to_normal(&self) -> Option<[f64; 3]> {
        match self {
            PlyProperty::XYZRgb(property) => property.to_normal(),
            PlyProperty::Dynamic(property) => property.to_normal(),
        }
    }
}
