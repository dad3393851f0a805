use nalgebra::Point3;

/// Closed polygons delineated on one axial plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ContourPlane {
    pub z: f64,
    /// Polygon vertices as (x, y) in mm.
    pub polygons: Vec<Vec<(f64, f64)>>,
}

impl ContourPlane {
    /// Even-odd rule over every polygon of the plane, so inner contours
    /// punch holes into outer ones.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons
            .iter()
            .filter(|polygon| point_in_polygon(polygon, x, y))
            .count()
            % 2
            == 1
    }
}

fn point_in_polygon(polygon: &[(f64, f64)], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut previous = match polygon.last() {
        Some(&vertex) => vertex,
        None => return false,
    };
    for &(xi, yi) in polygon {
        let (xj, yj) = previous;
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        previous = (xi, yi);
    }
    inside
}

/// A delineated anatomical region.
#[derive(Clone, Debug)]
pub struct Structure {
    pub id: String,
    planes: Vec<ContourPlane>,
    plane_spacing: f64,
}

impl Structure {
    /// Planes are sorted by z; coincident planes are merged.
    pub fn new(id: impl Into<String>, mut planes: Vec<ContourPlane>) -> Self {
        planes.sort_by(|a, b| a.z.total_cmp(&b.z));
        let mut merged: Vec<ContourPlane> = Vec::with_capacity(planes.len());
        for plane in planes {
            let coincident = merged
                .last()
                .is_some_and(|last| (last.z - plane.z).abs() < 1e-3);
            match merged.last_mut() {
                Some(last) if coincident => last.polygons.extend(plane.polygons),
                _ => merged.push(plane),
            }
        }
        let plane_spacing = Self::median_spacing(&merged);
        Self {
            id: id.into(),
            planes: merged,
            plane_spacing,
        }
    }

    fn median_spacing(planes: &[ContourPlane]) -> f64 {
        let mut gaps: Vec<f64> = planes.windows(2).map(|w| w[1].z - w[0].z).collect();
        if gaps.is_empty() {
            // a single plane is treated as one millimetre thick
            return 1.0;
        }
        gaps.sort_by(f64::total_cmp);
        gaps[gaps.len() / 2]
    }

    pub fn planes(&self) -> &[ContourPlane] {
        &self.planes
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Membership test against the nearest contour plane within half a
    /// plane spacing.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        let index = self.planes.partition_point(|plane| plane.z < point.z);
        let half = self.plane_spacing / 2.0;
        [index.checked_sub(1), Some(index)]
            .into_iter()
            .flatten()
            .filter_map(|i| self.planes.get(i))
            .filter(|plane| (plane.z - point.z).abs() <= half)
            .min_by(|a, b| (a.z - point.z).abs().total_cmp(&(b.z - point.z).abs()))
            .is_some_and(|plane| plane.contains(point.x, point.y))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StructureSet {
    pub id: String,
    pub structures: Vec<Structure>,
}

impl StructureSet {
    /// First structure whose id equals one of `names`, in order of `names`.
    pub fn find(&self, names: &[String]) -> Option<&Structure> {
        names
            .iter()
            .find_map(|name| self.structures.iter().find(|s| s.id == *name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Vec<(f64, f64)> {
        vec![(min, min), (max, min), (max, max), (min, max)]
    }

    fn tube(id: &str) -> Structure {
        let planes = (0..5)
            .map(|k| ContourPlane {
                z: k as f64 * 3.0,
                polygons: vec![square(0.0, 10.0)],
            })
            .collect();
        Structure::new(id, planes)
    }

    #[test]
    fn point_inside_square_is_contained() {
        let structure = tube("Esophagus");
        assert!(structure.contains(&Point3::new(5.0, 5.0, 6.0)));
        assert!(!structure.contains(&Point3::new(15.0, 5.0, 6.0)));
    }

    #[test]
    fn membership_extends_half_a_plane_spacing() {
        let structure = tube("Esophagus");
        assert!(structure.contains(&Point3::new(5.0, 5.0, 13.5)));
        assert!(!structure.contains(&Point3::new(5.0, 5.0, 13.6)));
        assert!(structure.contains(&Point3::new(5.0, 5.0, -1.5)));
        assert!(!structure.contains(&Point3::new(5.0, 5.0, -2.0)));
    }

    #[test]
    fn inner_contour_is_a_hole() {
        let plane = ContourPlane {
            z: 0.0,
            polygons: vec![square(0.0, 10.0), square(4.0, 6.0)],
        };
        assert!(plane.contains(2.0, 2.0));
        assert!(!plane.contains(5.0, 5.0));
    }

    #[test]
    fn coincident_planes_are_merged() {
        let structure = Structure::new(
            "Lung",
            vec![
                ContourPlane {
                    z: 0.0,
                    polygons: vec![square(0.0, 2.0)],
                },
                ContourPlane {
                    z: 0.0,
                    polygons: vec![square(5.0, 7.0)],
                },
            ],
        );
        assert_eq!(structure.planes().len(), 1);
        assert!(structure.contains(&Point3::new(6.0, 6.0, 0.0)));
    }

    #[test]
    fn find_follows_name_priority() {
        let set = StructureSet {
            id: "RS1".into(),
            structures: vec![tube("esophagus"), tube("Esophagus")],
        };
        let names = vec!["Esophagus".to_string(), "esophagus".to_string()];
        assert_eq!(set.find(&names).map(|s| s.id.as_str()), Some("Esophagus"));
        assert!(set.find(&["Heart".to_string()]).is_none());
    }
}
