use std::io::Write;

use super::{ColmapCamera, ColmapError, ColmapImage, ColmapPoint3d};

/// Write cameras in the `cameras.txt` layout.
///
/// Floats are written in their shortest round-trip form, so reading the output back yields
/// identical values.
pub fn write_cameras_txt<W: Write>(
    mut writer: W,
    cameras: &[ColmapCamera],
) -> Result<(), ColmapError> {
    writeln!(writer, "# Camera list with one line of data per camera:")?;
    writeln!(writer, "#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]")?;
    writeln!(writer, "# Number of cameras: {}", cameras.len())?;

    for camera in cameras {
        write!(
            writer,
            "{} {} {} {}",
            camera.camera_id,
            camera.model_id.name(),
            camera.width,
            camera.height
        )?;
        for param in &camera.params {
            write!(writer, " {}", param)?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write images in the `images.txt` layout: a pose line followed by an observation line,
/// which is left empty for images without keypoints.
pub fn write_images_txt<W: Write>(mut writer: W, images: &[ColmapImage]) -> Result<(), ColmapError> {
    let num_observations = images
        .iter()
        .flat_map(|image| image.points2d.iter())
        .filter(|point| point.point3d_id.is_some())
        .count();
    let mean_observations = match images.len() {
        0 => 0.0,
        n => num_observations as f64 / n as f64,
    };

    writeln!(writer, "# Image list with two lines of data per image:")?;
    writeln!(
        writer,
        "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME"
    )?;
    writeln!(writer, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    writeln!(
        writer,
        "# Number of images: {}, mean observations per image: {}",
        images.len(),
        mean_observations
    )?;

    for image in images {
        let [qw, qx, qy, qz] = image.rotation;
        let [tx, ty, tz] = image.translation;
        writeln!(
            writer,
            "{} {} {} {} {} {} {} {} {} {}",
            image.image_id, qw, qx, qy, qz, tx, ty, tz, image.camera_id, image.name
        )?;

        for (i, point) in image.points2d.iter().enumerate() {
            if i > 0 {
                write!(writer, " ")?;
            }
            match point.point3d_id {
                Some(id) => write!(writer, "{} {} {}", point.xy[0], point.xy[1], id)?,
                None => write!(writer, "{} {} -1", point.xy[0], point.xy[1])?,
            }
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write 3D points in the `points3D.txt` layout.
pub fn write_points3d_txt<W: Write>(
    mut writer: W,
    points: &[ColmapPoint3d],
) -> Result<(), ColmapError> {
    let track_length = points.iter().map(|point| point.track.len()).sum::<usize>();
    let mean_track_length = match points.len() {
        0 => 0.0,
        n => track_length as f64 / n as f64,
    };

    writeln!(writer, "# 3D point list with one line of data per point:")?;
    writeln!(
        writer,
        "#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)"
    )?;
    writeln!(
        writer,
        "# Number of points: {}, mean track length: {}",
        points.len(),
        mean_track_length
    )?;

    for point in points {
        let [x, y, z] = point.xyz;
        let [r, g, b] = point.rgb;
        write!(
            writer,
            "{} {} {} {} {} {} {} {}",
            point.point3d_id, x, y, z, r, g, b, point.error
        )?;
        for element in &point.track {
            write!(writer, " {} {}", element.image_id, element.point2d_idx)?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}
