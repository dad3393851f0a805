use std::path::Path;

use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_dictionary_std::tags;
use nalgebra::{Point3, Vector3};
use ndarray::s;
use thiserror::Error;
use tracing::debug;

use crate::dose_grid::{DoseGrid, GridGeometry};
use crate::enums::DoseUnit;
use crate::structure::{ContourPlane, Structure, StructureSet};

#[derive(Debug, Error)]
pub enum RtLoaderError {
    #[error("Missing or unreadable attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported modality {0}")]
    UnsupportedModality(String),

    #[error("Unsupported dose units {0}")]
    UnsupportedDoseUnits(String),

    #[error("Dose frames are not evenly spaced")]
    NonUniformFrameSpacing,

    #[error("Inconsistent dose grid dimensions")]
    InconsistentDimensions,

    #[error("Could not decode pixel data: {0}")]
    PixelData(String),

    #[error("Invalid contour data for ROI {0}")]
    InvalidContour(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Content of one DICOM-RT file.
#[derive(Debug)]
pub enum RtObject {
    Dose(DoseGrid),
    StructureSet(StructureSet),
}

pub struct RtLoader;

impl RtLoader {
    /// Load an RTDOSE or RTSTRUCT file, dispatching on its modality.
    ///
    /// # Errors
    ///
    /// Returns [`RtLoaderError::UnsupportedModality`] for any other modality
    pub fn load_file(path: impl AsRef<Path>) -> Result<RtObject, RtLoaderError> {
        let object = open_file(path.as_ref())?;
        match Self::modality(&object).as_deref() {
            Some("RTDOSE") => Ok(RtObject::Dose(Self::load_dose_from_dicom_object(&object)?)),
            Some("RTSTRUCT") => {
                let structure_set = Self::load_structure_set_from_dicom_object(&object)?;
                Ok(RtObject::StructureSet(structure_set))
            }
            other => Err(RtLoaderError::UnsupportedModality(other.unwrap_or_default().to_string())),
        }
    }

    pub fn modality(object: &InMemDicomObject) -> Option<String> {
        Self::string(object, tags::MODALITY)
    }

    /// Load a dose grid in Gy from an RTDOSE object.
    ///
    /// Stored values are multiplied by Dose Grid Scaling.
    pub fn load_dose_from_dicom_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<DoseGrid, RtLoaderError> {
        let units = Self::string(dicom_object, tags::DOSE_UNITS)
            .ok_or(RtLoaderError::MissingAttribute("DoseUnits"))?;
        if !units.eq_ignore_ascii_case("GY") {
            return Err(RtLoaderError::UnsupportedDoseUnits(units));
        }

        let geometry = Self::dose_geometry(dicom_object)?;
        let scaling = dicom_object
            .element(tags::DOSE_GRID_SCALING)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .unwrap_or(1.0) as f32;

        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| RtLoaderError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let mut data = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| RtLoaderError::PixelData(e.to_string()))?
            .slice_move(s![.., .., .., 0]);
        data.mapv_inplace(|value| value * scaling);

        let (width, height, depth) = geometry.size;
        if data.dim() != (depth, height, width) {
            return Err(RtLoaderError::InconsistentDimensions);
        }

        debug!(
            frames = depth,
            rows = height,
            columns = width,
            scaling,
            "Loaded RTDOSE"
        );
        Ok(DoseGrid::new(data, geometry, DoseUnit::Gy))
    }

    /// Grid placement from the image plane attributes and the frame offsets.
    pub fn dose_geometry(dicom_object: &InMemDicomObject) -> Result<GridGeometry, RtLoaderError> {
        let position = Self::floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .filter(|v| v.len() >= 3)
            .ok_or(RtLoaderError::MissingAttribute("ImagePositionPatient"))?;
        let orientation = Self::floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
            .filter(|v| v.len() >= 6)
            .ok_or(RtLoaderError::MissingAttribute("ImageOrientationPatient"))?;
        let spacing = Self::floats(dicom_object, tags::PIXEL_SPACING)
            .filter(|v| v.len() >= 2)
            .ok_or(RtLoaderError::MissingAttribute("PixelSpacing"))?;
        let rows = Self::count(dicom_object, tags::ROWS)
            .ok_or(RtLoaderError::MissingAttribute("Rows"))?;
        let columns = Self::count(dicom_object, tags::COLUMNS)
            .ok_or(RtLoaderError::MissingAttribute("Columns"))?;
        let frames = Self::count(dicom_object, tags::NUMBER_OF_FRAMES).unwrap_or(1);
        let offsets = Self::floats(dicom_object, tags::GRID_FRAME_OFFSET_VECTOR)
            .unwrap_or_else(|| vec![0.0]);

        if frames > 1 && offsets.len() != frames {
            return Err(RtLoaderError::MissingAttribute("GridFrameOffsetVector"));
        }

        let x_direction = Vector3::new(orientation[0], orientation[1], orientation[2]);
        let y_direction = Vector3::new(orientation[3], orientation[4], orientation[5]);
        let mut z_direction = x_direction.cross(&y_direction);

        let z_spacing = match Self::frame_spacing(&offsets)? {
            Some(spacing) => spacing,
            None => Self::floats(dicom_object, tags::SLICE_THICKNESS)
                .and_then(|v| v.first().copied())
                .filter(|&thickness| thickness > 0.0)
                .unwrap_or(1.0),
        };
        if z_spacing < 0.0 {
            z_direction = -z_direction;
        }

        // frame 0 sits at Image Position (Patient) for relative and absolute offsets
        Ok(GridGeometry {
            origin: Point3::new(position[0], position[1], position[2]),
            x_direction,
            y_direction,
            z_direction,
            resolution: (spacing[1], spacing[0], z_spacing.abs()),
            size: (columns, rows, frames),
        })
    }

    /// Common spacing of the frame offsets, `None` for a single frame.
    fn frame_spacing(offsets: &[f64]) -> Result<Option<f64>, RtLoaderError> {
        let [first, second, ..] = offsets else {
            return Ok(None);
        };
        let spacing = second - first;
        let uniform = offsets
            .windows(2)
            .all(|pair| ((pair[1] - pair[0]) - spacing).abs() < 1e-3);
        if !uniform || spacing == 0.0 {
            return Err(RtLoaderError::NonUniformFrameSpacing);
        }
        Ok(Some(spacing))
    }

    /// Structures with their closed planar contours from an RTSTRUCT object.
    pub fn load_structure_set_from_dicom_object(
        dicom_object: &InMemDicomObject,
    ) -> Result<StructureSet, RtLoaderError> {
        let rois = dicom_object
            .element(tags::STRUCTURE_SET_ROI_SEQUENCE)
            .ok()
            .and_then(|element| element.items())
            .ok_or(RtLoaderError::MissingAttribute("StructureSetROISequence"))?;
        let roi_contours = dicom_object
            .element(tags::ROI_CONTOUR_SEQUENCE)
            .ok()
            .and_then(|element| element.items())
            .unwrap_or(&[]);

        let mut structures = Vec::with_capacity(rois.len());
        for roi in rois {
            let number = Self::integer(roi, tags::ROI_NUMBER)
                .ok_or(RtLoaderError::MissingAttribute("ROINumber"))?;
            let name = Self::string(roi, tags::ROI_NAME)
                .ok_or(RtLoaderError::MissingAttribute("ROIName"))?;

            let mut planes = Vec::new();
            for roi_contour in roi_contours
                .iter()
                .filter(|item| Self::integer(item, tags::REFERENCED_ROI_NUMBER) == Some(number))
            {
                planes.extend(Self::contour_planes(roi_contour, &name)?);
            }
            structures.push(Structure::new(name, planes));
        }

        let id = Self::string(dicom_object, tags::STRUCTURE_SET_LABEL).unwrap_or_default();
        debug!(structure_set = %id, structures = structures.len(), "Loaded RTSTRUCT");
        Ok(StructureSet { id, structures })
    }

    fn contour_planes(
        roi_contour: &InMemDicomObject,
        name: &str,
    ) -> Result<Vec<ContourPlane>, RtLoaderError> {
        let contours = roi_contour
            .element(tags::CONTOUR_SEQUENCE)
            .ok()
            .and_then(|element| element.items())
            .unwrap_or(&[]);

        let mut planes = Vec::with_capacity(contours.len());
        for contour in contours {
            let closed = Self::string(contour, tags::CONTOUR_GEOMETRIC_TYPE)
                .is_some_and(|kind| kind == "CLOSED_PLANAR");
            if !closed {
                continue;
            }
            let data = Self::floats(contour, tags::CONTOUR_DATA)
                .filter(|data| !data.is_empty() && data.len() % 3 == 0)
                .ok_or_else(|| RtLoaderError::InvalidContour(name.to_string()))?;
            let polygon = data.chunks_exact(3).map(|p| (p[0], p[1])).collect();
            planes.push(ContourPlane {
                z: data[2],
                polygons: vec![polygon],
            });
        }
        Ok(planes)
    }

    fn string(object: &InMemDicomObject, tag: Tag) -> Option<String> {
        object
            .element(tag)
            .ok()?
            .to_str()
            .ok()
            .map(|value| value.trim().to_string())
    }

    fn floats(object: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
        object.element(tag).ok()?.to_multi_float64().ok()
    }

    fn integer(object: &InMemDicomObject, tag: Tag) -> Option<i32> {
        object.element(tag).ok()?.to_int::<i32>().ok()
    }

    fn count(object: &InMemDicomObject, tag: Tag) -> Option<usize> {
        Self::integer(object, tag)
            .and_then(|value| usize::try_from(value).ok())
            .filter(|&value| value > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    fn floats(tag: Tag, vr: VR, values: &[f64]) -> DataElement<InMemDicomObject> {
        let values = values.iter().copied().collect();
        DataElement::new(tag, vr, PrimitiveValue::F64(values))
    }

    fn dose_header(offsets: &[f64]) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("RTDOSE")),
            floats(tags::IMAGE_POSITION_PATIENT, VR::DS, &[-10.0, -20.0, 5.0]),
            floats(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            ),
            floats(tags::PIXEL_SPACING, VR::DS, &[2.0, 2.5]),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(6_u16)),
            DataElement::new(
                tags::NUMBER_OF_FRAMES,
                VR::IS,
                PrimitiveValue::from(offsets.len().to_string()),
            ),
            floats(tags::GRID_FRAME_OFFSET_VECTOR, VR::DS, offsets),
        ])
    }

    #[test]
    fn geometry_from_dose_header() {
        let geometry = RtLoader::dose_geometry(&dose_header(&[0.0, 3.0, 6.0])).unwrap();
        assert_eq!(geometry.origin, Point3::new(-10.0, -20.0, 5.0));
        assert_eq!(geometry.resolution, (2.5, 2.0, 3.0));
        assert_eq!(geometry.size, (6, 4, 3));
        assert_eq!(geometry.z_direction, Vector3::z());
    }

    #[test]
    fn descending_frame_offsets_flip_the_slice_direction() {
        let geometry = RtLoader::dose_geometry(&dose_header(&[0.0, -3.0, -6.0])).unwrap();
        assert_eq!(geometry.resolution.2, 3.0);
        assert_eq!(geometry.z_direction, -Vector3::<f64>::z());
    }

    #[test]
    fn non_uniform_frame_offsets_are_rejected() {
        let result = RtLoader::dose_geometry(&dose_header(&[0.0, 3.0, 7.0]));
        assert!(matches!(result, Err(RtLoaderError::NonUniformFrameSpacing)));
    }

    #[test]
    fn missing_orientation_is_reported() {
        let mut header = dose_header(&[0.0, 3.0]);
        header.remove_element(tags::IMAGE_ORIENTATION_PATIENT);
        let result = RtLoader::dose_geometry(&header);
        assert!(matches!(
            result,
            Err(RtLoaderError::MissingAttribute("ImageOrientationPatient"))
        ));
    }

    fn contour(z: f64) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::CONTOUR_GEOMETRIC_TYPE,
                VR::CS,
                PrimitiveValue::from("CLOSED_PLANAR"),
            ),
            floats(
                tags::CONTOUR_DATA,
                VR::DS,
                &[0.0, 0.0, z, 10.0, 0.0, z, 10.0, 10.0, z, 0.0, 10.0, z],
            ),
        ])
    }

    fn structure_set() -> InMemDicomObject {
        let roi = |number: i32, name: &str| {
            InMemDicomObject::from_element_iter([
                DataElement::new(tags::ROI_NUMBER, VR::IS, PrimitiveValue::from(number)),
                DataElement::new(tags::ROI_NAME, VR::LO, PrimitiveValue::from(name)),
            ])
        };
        let roi_contour = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::REFERENCED_ROI_NUMBER,
                VR::IS,
                PrimitiveValue::from(2_i32),
            ),
            DataElement::new(
                tags::CONTOUR_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![contour(0.0), contour(3.0)]),
            ),
        ]);
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("RTSTRUCT")),
            DataElement::new(
                tags::STRUCTURE_SET_LABEL,
                VR::SH,
                PrimitiveValue::from("RS1 "),
            ),
            DataElement::new(
                tags::STRUCTURE_SET_ROI_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![roi(1, "Heart"), roi(2, "Esophagus")]),
            ),
            DataElement::new(
                tags::ROI_CONTOUR_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![roi_contour]),
            ),
        ])
    }

    #[test]
    fn structures_are_read_with_their_contours() {
        let object = structure_set();
        assert_eq!(RtLoader::modality(&object).as_deref(), Some("RTSTRUCT"));

        let set = RtLoader::load_structure_set_from_dicom_object(&object).unwrap();
        assert_eq!(set.id, "RS1");
        assert_eq!(set.structures.len(), 2);

        let heart = &set.structures[0];
        assert!(heart.is_empty());

        let esophagus = &set.structures[1];
        assert_eq!(esophagus.id, "Esophagus");
        assert_eq!(esophagus.planes().len(), 2);
        assert!(esophagus.contains(&Point3::new(5.0, 5.0, 1.0)));
        assert!(!esophagus.contains(&Point3::new(5.0, 5.0, 5.0)));
    }

    #[test]
    fn structure_set_without_roi_sequence_is_rejected() {
        let object = InMemDicomObject::from_element_iter([DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("RTSTRUCT"),
        )]);
        let result = RtLoader::load_structure_set_from_dicom_object(&object);
        assert!(matches!(
            result,
            Err(RtLoaderError::MissingAttribute("StructureSetROISequence"))
        ));
    }
}
