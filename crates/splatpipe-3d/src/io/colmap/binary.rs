use std::{
    fs::File,
    io::{BufReader, ErrorKind, Read},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use super::{
    CameraModelId, ColmapCamera, ColmapError, ColmapImage, ColmapPoint2d, ColmapPoint3d,
    ColmapTrackElement,
};

/// Little-endian field reader used by the COLMAP binary readers.
pub struct BinaryReader<R> {
    reader: R,
    path: PathBuf,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self) -> std::io::Result<$ty> {
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            self.reader.read_exact(&mut bytes)?;
            Ok(<$ty>::from_le_bytes(bytes))
        }
    };
}

impl<R: Read> BinaryReader<R> {
    read_le!(read_u8, u8);
    read_le!(read_i32, i32);
    read_le!(read_u32, u32);
    read_le!(read_i64, i64);
    read_le!(read_u64, u64);
    read_le!(read_f64, f64);

    fn read_f64_array<const N: usize>(&mut self) -> std::io::Result<[f64; N]> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.read_f64()?;
        }
        Ok(values)
    }

    fn read_null_terminated(&mut self) -> std::io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        String::from_utf8(bytes).map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
    }
}

/// A record type that can be read from a COLMAP binary file.
pub trait BinaryRecord: Sized {
    /// Read one record.
    fn read_binary<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, ColmapError>;
}

/// Lazy sequence of records read from a COLMAP binary file.
///
/// The file starts with a `u64` record count; the sequence yields exactly that many records
/// or fails with [`ColmapError::Truncated`].
pub struct BinaryRecords<R, T> {
    reader: BinaryReader<R>,
    remaining: u64,
    failed: bool,
    _record: PhantomData<T>,
}

impl<T: BinaryRecord> BinaryRecords<BufReader<File>, T> {
    /// Open a file for streaming.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ColmapError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read, T: BinaryRecord> BinaryRecords<R, T> {
    /// Stream records from an already opened reader. `source` names it in errors.
    pub fn from_reader(reader: R, source: impl Into<PathBuf>) -> Result<Self, ColmapError> {
        let mut reader = BinaryReader {
            reader,
            path: source.into(),
        };
        let remaining = reader.read_u64().map_err(|e| truncated(&reader.path, 0, e))?;
        Ok(Self {
            reader,
            remaining,
            failed: false,
            _record: PhantomData,
        })
    }

    /// Number of records not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read, T: BinaryRecord> Iterator for BinaryRecords<R, T> {
    type Item = Result<T, ColmapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        match T::read_binary(&mut self.reader) {
            Ok(record) => {
                self.remaining -= 1;
                Some(Ok(record))
            }
            Err(ColmapError::IoError(e)) => {
                self.failed = true;
                Some(Err(truncated(&self.reader.path, self.remaining, e)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn truncated(path: &Path, remaining: u64, e: std::io::Error) -> ColmapError {
    match e.kind() {
        ErrorKind::UnexpectedEof => ColmapError::Truncated {
            path: path.to_path_buf(),
            remaining,
        },
        _ => ColmapError::IoError(e),
    }
}

/// Streaming reader over `cameras.bin`.
pub type CamerasBin<R> = BinaryRecords<R, ColmapCamera>;

/// Streaming reader over `images.bin`.
pub type ImagesBin<R> = BinaryRecords<R, ColmapImage>;

/// Streaming reader over `points3D.bin`.
pub type Points3dBin<R> = BinaryRecords<R, ColmapPoint3d>;

impl BinaryRecord for ColmapCamera {
    fn read_binary<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, ColmapError> {
        let camera_id = reader.read_u32()?;
        let model = reader.read_i32()?;
        let model_id =
            CameraModelId::from_id(model).ok_or_else(|| ColmapError::UnknownCameraModel {
                path: reader.path.clone(),
                model_id: model,
            })?;
        let width = reader.read_u64()? as usize;
        let height = reader.read_u64()? as usize;
        let params = (0..model_id.num_params())
            .map(|_| reader.read_f64())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ColmapCamera {
            camera_id,
            model_id,
            width,
            height,
            params,
        })
    }
}

impl BinaryRecord for ColmapImage {
    fn read_binary<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, ColmapError> {
        let image_id = reader.read_u32()?;
        let rotation = reader.read_f64_array::<4>()?;
        let translation = reader.read_f64_array::<3>()?;
        let camera_id = reader.read_u32()?;
        let name = reader.read_null_terminated()?;

        let num_points2d = reader.read_u64()?;
        let mut points2d = Vec::new();
        for _ in 0..num_points2d {
            let xy = reader.read_f64_array::<2>()?;
            let point3d_id = match reader.read_i64()? {
                -1 => None,
                id => Some(u64::try_from(id).map_err(|_| ColmapError::InvalidPoint3dId {
                    path: reader.path.clone(),
                    image_id,
                    point3d_id: id,
                })?),
            };
            points2d.push(ColmapPoint2d { xy, point3d_id });
        }

        Ok(ColmapImage {
            image_id,
            rotation,
            translation,
            camera_id,
            name,
            points2d,
        })
    }
}

impl BinaryRecord for ColmapPoint3d {
    fn read_binary<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self, ColmapError> {
        let point3d_id = reader.read_u64()?;
        let xyz = reader.read_f64_array::<3>()?;
        let rgb = [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?];
        let error = reader.read_f64()?;

        let track_length = reader.read_u64()?;
        let mut track = Vec::new();
        for _ in 0..track_length {
            track.push(ColmapTrackElement {
                image_id: reader.read_u32()?,
                point2d_idx: reader.read_u32()?,
            });
        }

        Ok(ColmapPoint3d {
            point3d_id,
            xyz,
            rgb,
            error,
            track,
        })
    }
}
