use std::fmt;

use ndarray::Array1;

use crate::{
    errors::{Error, Result},
    file::File,
};

/// Global information about a PSC run.
///
/// Describes the simulation domain: the global grid dimensions, the physical extent of the domain
/// and the position of its lower corner, along with cell coordinates along each axis.
///
#[derive(Clone)]
pub struct RunInfo {
    /// Number of grid cells along each axis
    pub gdims: [usize; 3],

    /// Physical extent of the domain along each axis
    pub length: [f64; 3],

    /// Physical position of the lower corner of the domain
    pub corner: [f64; 3],

    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub z: Array1<f64>,
}

impl RunInfo {
    /// Derive run information from an open file.
    ///
    /// The grid dimensions are the first three axes of the first variable in the file. Which
    /// variable that is depends on the engine's catalog order, but all field variables in a PSC
    /// output file share their spatial shape.
    ///
    /// # Arguments
    ///
    /// * `file` - The file to inspect. The caller must hold the engine lock.
    /// * `length` - Overrides the "length" attribute, if any.
    /// * `corner` - Overrides the "corner" attribute, if any. Without either, the domain is
    ///   centered on the origin if the file has a "length" attribute, and has its corner at the
    ///   origin otherwise.
    ///
    pub fn new(file: &File, length: Option<[f64; 3]>, corner: Option<[f64; 3]>) -> Result<Self> {
        let reference = file
            .variable_names()
            .first()
            .ok_or_else(|| Error::EmptyCatalog(file.path().to_path_buf()))?;
        let variable = file.get_variable(reference)?;
        let shape = variable.shape()?;
        if shape.len() < 3 {
            return Err(Error::Shape(format!(
                "{reference} has shape {shape:?}, need at least 3 axes to derive grid dimensions"
            )));
        }
        let gdims = [shape[0], shape[1], shape[2]];

        let has_attribute = |name: &str| file.attribute_names().iter().any(|attr| attr == name);

        let length = match length {
            Some(length) => length,
            None if has_attribute("length") => vector_attribute(file, "length")?,
            None => gdims.map(|n| n as f64),
        };

        let corner = match corner {
            Some(corner) => corner,
            None if has_attribute("corner") => vector_attribute(file, "corner")?,
            None if has_attribute("length") => length.map(|l| -0.5 * l),
            None => [0.0; 3],
        };

        let info = Self {
            gdims,
            length,
            corner,
            x: coordinate(gdims[0], length[0], corner[0]),
            y: coordinate(gdims[1], length[1], corner[1]),
            z: coordinate(gdims[2], length[2], corner[2]),
        };
        log::debug!("{info:?} from {reference}");

        Ok(info)
    }

    /// Get the coordinate vector for an axis, 0, 1, or 2. `None` for any other axis.
    ///
    pub fn coord(&self, axis: usize) -> Option<&Array1<f64>> {
        match axis {
            0 => Some(&self.x),
            1 => Some(&self.y),
            2 => Some(&self.z),
            _ => None,
        }
    }
}

impl fmt::Debug for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunInfo(gdims={:?}, length={:?}, corner={:?})",
            self.gdims, self.length, self.corner
        )
    }
}

/// `n` evenly spaced points from `corner`, up to but not including `corner + length`
fn coordinate(n: usize, length: f64, corner: f64) -> Array1<f64> {
    let step = length / n as f64;
    Array1::from_iter((0..n).map(|i| corner + i as f64 * step))
}

fn vector_attribute(file: &File, name: &str) -> Result<[f64; 3]> {
    let values = file
        .get_attribute(name)?
        .to_f64_vec()
        .ok_or_else(|| Error::Attribute {
            name: name.to_string(),
            reason: String::from("expecting numeric data"),
        })?;

    values.try_into().map_err(|values: Vec<f64>| Error::Attribute {
        name: name.to_string(),
        reason: format!("expecting 3 values, found {}", values.len()),
    })
}
