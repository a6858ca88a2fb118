//! In-memory connectometry population.
//!
//! File formats are handled by the caller; this module only validates that
//! the decoded arrays agree with one geometry and precomputes the per-subject
//! normalization scales and the fiber threshold.

use crate::constants::{FIBER_THRESHOLD_RATIO, OTSU_BINS};
use crate::error::DatabaseError;
use crate::statistics::{otsu_threshold, std_dev_f32};

/// Volume dimensions and voxel size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    dim: [usize; 3],
    voxel_size: [f32; 3],
}

impl Geometry {
    /// Validate and create a geometry.
    pub fn new(dim: [usize; 3], voxel_size: [f32; 3]) -> Result<Self, DatabaseError> {
        if dim.iter().any(|&d| d == 0) {
            return Err(DatabaseError::Geometry(format!("zero dimension in {dim:?}")));
        }
        if voxel_size.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
            return Err(DatabaseError::Geometry(format!(
                "non-positive voxel size {voxel_size:?}"
            )));
        }
        Ok(Self { dim, voxel_size })
    }

    /// Dimensions (x, y, z).
    pub fn dim(&self) -> [usize; 3] {
        self.dim
    }

    /// Voxel size (mm).
    pub fn voxel_size(&self) -> [f32; 3] {
        self.voxel_size
    }

    /// Total voxels.
    pub fn voxel_count(&self) -> usize {
        self.dim[0] * self.dim[1] * self.dim[2]
    }

    /// Volume of one voxel in mm³.
    pub fn voxel_volume(&self) -> f64 {
        self.voxel_size.iter().map(|&v| v as f64).product()
    }

    /// Linear index to (x, y, z).
    pub fn coordinates(&self, index: usize) -> [usize; 3] {
        let x = index % self.dim[0];
        let y = (index / self.dim[0]) % self.dim[1];
        let z = index / (self.dim[0] * self.dim[1]);
        [x, y, z]
    }

    fn check(&self, what: &str, len: usize) -> Result<(), DatabaseError> {
        if len != self.voxel_count() {
            return Err(DatabaseError::VoxelCountMismatch {
                what: what.to_string(),
                expected: self.voxel_count(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// Population of subjects sharing one template geometry.
#[derive(Debug, Clone)]
pub struct Database {
    geometry: Geometry,
    fiber_presence: Vec<f32>,
    fiber_directions: Vec<[f32; 3]>,
    fiber_threshold: f32,
    subject_names: Vec<String>,
    subject_data: Vec<Vec<f32>>,
    subject_scale: Vec<f32>,
}

impl Database {
    /// Build a population from decoded arrays.
    ///
    /// `fiber_presence` is the template's primary anisotropy map; the fiber
    /// threshold defaults to 0.6 × its Otsu threshold. Each entry of
    /// `subject_data` is one subject's scalar field over the same geometry.
    pub fn new(
        geometry: Geometry,
        fiber_presence: Vec<f32>,
        subject_data: Vec<Vec<f32>>,
    ) -> Result<Self, DatabaseError> {
        geometry.check("fiber presence map", fiber_presence.len())?;
        if subject_data.is_empty() {
            return Err(DatabaseError::Empty);
        }
        for (i, field) in subject_data.iter().enumerate() {
            geometry.check(&format!("subject {i}"), field.len())?;
        }

        let fiber_threshold =
            (FIBER_THRESHOLD_RATIO * otsu_threshold(&fiber_presence, OTSU_BINS) as f64) as f32;
        let subject_scale = subject_data.iter().map(|f| inverse_sd(f)).collect();
        let subject_names = (0..subject_data.len())
            .map(|i| format!("subject{}", i + 1))
            .collect();

        Ok(Self {
            geometry,
            fiber_directions: vec![[0.0; 3]; fiber_presence.len()],
            fiber_presence,
            fiber_threshold,
            subject_names,
            subject_data,
            subject_scale,
        })
    }

    /// Replace the generated subject names.
    pub fn with_subject_names(mut self, names: Vec<String>) -> Result<Self, DatabaseError> {
        if names.len() != self.subject_data.len() {
            return Err(DatabaseError::NameCountMismatch {
                names: names.len(),
                fields: self.subject_data.len(),
            });
        }
        self.subject_names = names;
        Ok(self)
    }

    /// Attach the primary fiber direction of every voxel (passed through to the tracker).
    pub fn with_fiber_directions(mut self, directions: Vec<[f32; 3]>) -> Result<Self, DatabaseError> {
        self.geometry.check("fiber direction map", directions.len())?;
        self.fiber_directions = directions;
        Ok(self)
    }

    /// Override the automatic fiber threshold.
    pub fn with_fiber_threshold(mut self, threshold: f32) -> Self {
        self.fiber_threshold = threshold;
        self
    }

    /// Shared geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Template anisotropy map.
    pub fn fiber_presence(&self) -> &[f32] {
        &self.fiber_presence
    }

    /// Primary fiber direction per voxel.
    pub fn fiber_directions(&self) -> &[[f32; 3]] {
        &self.fiber_directions
    }

    /// Voxels at or below this anisotropy carry no statistic.
    pub fn fiber_threshold(&self) -> f32 {
        self.fiber_threshold
    }

    /// Whether a voxel is inside the fiber mask.
    #[inline]
    pub fn is_fiber(&self, voxel: usize) -> bool {
        self.fiber_presence[voxel] > self.fiber_threshold
    }

    /// Number of subjects.
    pub fn subject_count(&self) -> usize {
        self.subject_data.len()
    }

    /// Subject names.
    pub fn subject_names(&self) -> &[String] {
        &self.subject_names
    }

    /// One subject's scalar field.
    pub fn subject_field(&self, subject: usize) -> &[f32] {
        &self.subject_data[subject]
    }

    /// Multiplier applied to a subject's values (1/sd when normalizing).
    #[inline]
    pub fn scale(&self, subject: usize, normalize: bool) -> f64 {
        if normalize {
            self.subject_scale[subject] as f64
        } else {
            1.0
        }
    }

    /// One subject's value at one voxel, normalized if requested.
    #[inline]
    pub fn value(&self, subject: usize, voxel: usize, normalize: bool) -> f64 {
        self.subject_data[subject][voxel] as f64 * self.scale(subject, normalize)
    }

    /// Every subject's value at one voxel, in database order.
    pub fn data_at(&self, voxel: usize, normalize: bool) -> Vec<f64> {
        (0..self.subject_count())
            .map(|s| self.value(s, voxel, normalize))
            .collect()
    }

    /// Remove a subject from the population.
    pub fn remove_subject(&mut self, index: usize) -> Result<(), DatabaseError> {
        if index >= self.subject_count() {
            return Err(DatabaseError::NoSuchSubject {
                index,
                count: self.subject_count(),
            });
        }
        if self.subject_count() == 1 {
            return Err(DatabaseError::Empty);
        }
        self.subject_data.remove(index);
        self.subject_names.remove(index);
        self.subject_scale.remove(index);
        Ok(())
    }
}

/// Study patients compared against a [`Database`] in individual analysis.
#[derive(Debug, Clone)]
pub struct Patients {
    names: Vec<String>,
    data: Vec<Vec<f32>>,
    scale: Vec<f32>,
}

impl Patients {
    /// Validate patient fields against the population geometry.
    pub fn new(
        database: &Database,
        names: Vec<String>,
        data: Vec<Vec<f32>>,
    ) -> Result<Self, DatabaseError> {
        if data.is_empty() {
            return Err(DatabaseError::IncompatiblePatient("no patient fields".into()));
        }
        if names.len() != data.len() {
            return Err(DatabaseError::NameCountMismatch {
                names: names.len(),
                fields: data.len(),
            });
        }
        let expected = database.geometry().voxel_count();
        for (name, field) in names.iter().zip(&data) {
            if field.len() != expected {
                return Err(DatabaseError::IncompatiblePatient(format!(
                    "{name} has {} voxels, population has {expected}",
                    field.len()
                )));
            }
        }
        let scale = data.iter().map(|f| inverse_sd(f)).collect();
        Ok(Self { names, data, scale })
    }

    /// Number of patients.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether there are no patients.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Patient names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// One patient's value at one voxel, normalized if requested.
    #[inline]
    pub fn value(&self, patient: usize, voxel: usize, normalize: bool) -> f64 {
        let scale = if normalize { self.scale[patient] as f64 } else { 1.0 };
        self.data[patient][voxel] as f64 * scale
    }
}

fn inverse_sd(field: &[f32]) -> f32 {
    let sd = std_dev_f32(field);
    if sd == 0.0 {
        1.0
    } else {
        (1.0 / sd) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::new([2, 2, 1], [2.0, 2.0, 2.0]).unwrap()
    }

    #[test]
    fn test_geometry_rejects_zero_dimension() {
        assert!(Geometry::new([0, 2, 2], [1.0; 3]).is_err());
        assert!(Geometry::new([2, 2, 2], [1.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_geometry_coordinates_and_volume() {
        let g = Geometry::new([3, 4, 5], [1.0, 2.0, 0.5]).unwrap();
        assert_eq!(g.voxel_count(), 60);
        assert_eq!(g.coordinates(0), [0, 0, 0]);
        assert_eq!(g.coordinates(3 + 2 * 12), [0, 1, 2]);
        assert!((g.voxel_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_database_rejects_mismatched_subject() {
        let err = Database::new(geometry(), vec![1.0; 4], vec![vec![1.0; 4], vec![1.0; 3]])
            .unwrap_err();
        assert!(matches!(err, DatabaseError::VoxelCountMismatch { actual: 3, .. }));
    }

    #[test]
    fn test_database_empty_population() {
        assert_eq!(
            Database::new(geometry(), vec![1.0; 4], vec![]).unwrap_err(),
            DatabaseError::Empty
        );
    }

    #[test]
    fn test_fiber_mask_uses_threshold() {
        let db = Database::new(geometry(), vec![0.0, 0.0, 1.0, 1.0], vec![vec![1.0; 4]])
            .unwrap()
            .with_fiber_threshold(0.5);
        assert!(!db.is_fiber(0));
        assert!(db.is_fiber(3));
    }

    #[test]
    fn test_normalization_scale() {
        let db = Database::new(
            geometry(),
            vec![1.0; 4],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0; 4]],
        )
        .unwrap();
        let sd = std_dev_f32(&[1.0, 2.0, 3.0, 4.0]);
        assert!((db.value(0, 1, true) - 2.0 / sd).abs() < 1e-5);
        // Zero-variance subject keeps its raw values.
        assert_eq!(db.value(1, 0, true), 5.0);
        assert_eq!(db.value(0, 1, false), 2.0);
    }

    #[test]
    fn test_remove_subject_keeps_names_aligned() {
        let mut db = Database::new(geometry(), vec![1.0; 4], vec![vec![1.0; 4], vec![2.0; 4]])
            .unwrap()
            .with_subject_names(vec!["a".into(), "b".into()])
            .unwrap();
        db.remove_subject(0).unwrap();
        assert_eq!(db.subject_names(), ["b".to_string()]);
        assert_eq!(db.subject_field(0)[0], 2.0);
        assert!(db.remove_subject(0).is_err());
    }

    #[test]
    fn test_patients_must_match_geometry() {
        let db = Database::new(geometry(), vec![1.0; 4], vec![vec![1.0; 4]]).unwrap();
        assert!(Patients::new(&db, vec!["p".into()], vec![vec![1.0; 5]]).is_err());
        let p = Patients::new(&db, vec!["p".into()], vec![vec![1.0; 4]]).unwrap();
        assert_eq!(p.len(), 1);
    }
}
