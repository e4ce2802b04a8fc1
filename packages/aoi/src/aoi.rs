//! The [`AreaOfInterest`] type and its serializations.
//!
//! An AOI is one or more polygons in WGS84 decimal degrees. It is loaded once
//! from `GeoJSON` at the start of a report run and never mutated; the
//! simplifier derives new AOIs from it.

use std::path::Path;

use geo::{
    BooleanOps, BoundingRect, Centroid, Coord, CoordsIter, MapCoords, MultiPolygon, Polygon, Rect,
};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use geozero::{CoordDimensions, ToWkb};
use riverscapes_aoi_models::{SerializationFormat, WGS84_EPSG};
use wkt::ToWkt;

use crate::AoiError;
use crate::bbox::round_to;

/// Decimal places written for `GeoJSON` coordinates (about 10 cm), as
/// recommended by RFC 7946 to keep documents small.
pub const GEOJSON_DECIMALS: i32 = 6;

/// One or more polygons in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    parts: Vec<Polygon<f64>>,
    epsg: Option<u32>,
}

impl AreaOfInterest {
    /// Builds a WGS84 AOI from polygons.
    ///
    /// Polygons without any exterior coordinates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::EmptyAoi`] if no polygon has coordinates.
    pub fn new(parts: Vec<Polygon<f64>>) -> Result<Self, AoiError> {
        Self::with_epsg(parts, Some(WGS84_EPSG))
    }

    /// Builds an AOI with an explicit (possibly unset) CRS tag.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::EmptyAoi`] if no polygon has coordinates, or
    /// [`AoiError::UnsupportedCrs`] for a CRS other than WGS84.
    pub fn with_epsg(parts: Vec<Polygon<f64>>, epsg: Option<u32>) -> Result<Self, AoiError> {
        if let Some(code) = epsg.filter(|&code| code != WGS84_EPSG) {
            return Err(AoiError::UnsupportedCrs {
                name: format!("EPSG:{code}"),
            });
        }

        let total = parts.len();
        let parts: Vec<_> = parts
            .into_iter()
            .filter(|p| !p.exterior().0.is_empty())
            .collect();

        if parts.is_empty() {
            return Err(AoiError::EmptyAoi);
        }
        if parts.len() < total {
            log::debug!("Dropped {} empty polygon(s) from AOI", total - parts.len());
        }

        Ok(Self { parts, epsg })
    }

    /// Builds an AOI from any polygonal geometry.
    ///
    /// Geometry collections are flattened.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::UnsupportedGeometry`] for points and lines, or
    /// [`AoiError::EmptyAoi`] if nothing polygonal remains.
    pub fn from_geometry(geometry: geo::Geometry<f64>) -> Result<Self, AoiError> {
        let mut parts = Vec::new();
        push_polygons(geometry, &mut parts)?;
        Self::new(parts)
    }

    /// Parses an AOI from a `GeoJSON` `FeatureCollection`, `Feature` or bare
    /// geometry.
    ///
    /// Features without geometry are skipped. A legacy `crs` member is
    /// honoured only if it names WGS84.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError`] if the text is not `GeoJSON`, declares another
    /// CRS, contains non-polygonal geometry, or contains no polygons.
    pub fn from_geojson_str(text: &str) -> Result<Self, AoiError> {
        let geojson: GeoJson = text.parse()?;
        let mut parts = Vec::new();

        match geojson {
            GeoJson::FeatureCollection(collection) => {
                check_crs(collection.foreign_members.as_ref())?;
                for feature in collection.features {
                    push_feature(feature, &mut parts)?;
                }
            }
            GeoJson::Feature(feature) => {
                check_crs(feature.foreign_members.as_ref())?;
                push_feature(feature, &mut parts)?;
            }
            GeoJson::Geometry(geometry) => {
                check_crs(geometry.foreign_members.as_ref())?;
                push_polygons(geometry.try_into()?, &mut parts)?;
            }
        }

        Self::new(parts)
    }

    /// Reads an AOI from a `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, AoiError> {
        let text = std::fs::read_to_string(path)?;
        let aoi = Self::from_geojson_str(&text)?;
        log::info!(
            "Loaded AOI from {} ({} part(s), {} vertices)",
            path.display(),
            aoi.parts.len(),
            aoi.vertex_count()
        );
        Ok(aoi)
    }

    /// Creates a new AOI from parts derived from this one, keeping the CRS
    /// tag (WGS84 when unset).
    pub(crate) fn derive(&self, parts: Vec<Polygon<f64>>) -> Result<Self, AoiError> {
        Self::with_epsg(parts, self.epsg.or(Some(WGS84_EPSG)))
    }

    /// The AOI's polygons, in input order.
    #[must_use]
    pub fn parts(&self) -> &[Polygon<f64>] {
        &self.parts
    }

    /// EPSG code of the AOI's coordinates, if one was declared.
    #[must_use]
    pub const fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Total number of coordinates across all rings of all parts.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(CoordsIter::coords_count).sum()
    }

    /// Total extent of all parts.
    #[must_use]
    pub fn total_bounds(&self) -> Rect<f64> {
        let mut min = Coord {
            x: f64::INFINITY,
            y: f64::INFINITY,
        };
        let mut max = Coord {
            x: f64::NEG_INFINITY,
            y: f64::NEG_INFINITY,
        };

        for rect in self.parts.iter().filter_map(BoundingRect::bounding_rect) {
            min.x = min.x.min(rect.min().x);
            min.y = min.y.min(rect.min().y);
            max.x = max.x.max(rect.max().x);
            max.y = max.y.max(rect.max().y);
        }

        Rect::new(min, max)
    }

    /// Dissolves all parts into a single geometry.
    ///
    /// Single-part AOIs are returned as-is without running the boolean
    /// union.
    #[must_use]
    pub fn union(&self) -> UnionedGeometry {
        let mut parts = self.parts.iter();
        let Some(first) = parts.next() else {
            return UnionedGeometry(MultiPolygon::new(Vec::new()));
        };

        let mut dissolved = MultiPolygon::new(vec![first.clone()]);
        for part in parts {
            dissolved = dissolved.union(&MultiPolygon::new(vec![part.clone()]));
        }

        UnionedGeometry(dissolved)
    }

    /// The AOI as a `GeoJSON` `FeatureCollection`, one feature per part,
    /// with coordinates rounded to [`GEOJSON_DECIMALS`].
    #[must_use]
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .parts
            .iter()
            .map(|part| {
                let rounded = part.map_coords(|c| Coord {
                    x: round_to(c.x, GEOJSON_DECIMALS),
                    y: round_to(c.y, GEOJSON_DECIMALS),
                });
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(&rounded))),
                    id: None,
                    properties: None,
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    /// The AOI serialized as compact `GeoJSON` text.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Json`] if serialization fails.
    pub fn to_geojson_string(&self) -> Result<String, AoiError> {
        Ok(serde_json::to_string(&self.to_feature_collection())?)
    }

    /// Writes the AOI to a `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError`] if serialization or the write fails.
    pub fn write_geojson(&self, path: &Path) -> Result<(), AoiError> {
        std::fs::write(path, self.to_geojson_string()?)?;
        log::info!("Wrote AOI to {}", path.display());
        Ok(())
    }

    /// Total length of every part's WKB, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Wkb`] if a part cannot be encoded.
    pub fn wkb_hex_len(&self) -> Result<usize, AoiError> {
        self.parts.iter().try_fold(0, |total, part| {
            let bytes = encode_wkb(&geo::Geometry::Polygon(part.clone()))?;
            Ok(total + bytes.len() * 2)
        })
    }

    /// Size of the AOI's plain serialization in `format`, in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError`] if the AOI cannot be serialized.
    pub fn serialized_size(&self, format: SerializationFormat) -> Result<usize, AoiError> {
        match format {
            SerializationFormat::GeoJson => Ok(self.to_geojson_string()?.len()),
            SerializationFormat::Wkb => self.wkb_hex_len(),
        }
    }
}

/// All parts of an [`AreaOfInterest`] dissolved into one geometry.
///
/// Used transiently to size the query expression and as the operand of the
/// exact intersection test.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionedGeometry(MultiPolygon<f64>);

impl UnionedGeometry {
    /// The dissolved polygons.
    #[must_use]
    pub const fn polygons(&self) -> &MultiPolygon<f64> {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_inner(self) -> MultiPolygon<f64> {
        self.0
    }

    /// The geometry as a `POLYGON` when it dissolved into one piece,
    /// otherwise a `MULTIPOLYGON`.
    #[must_use]
    pub fn to_geometry(&self) -> geo::Geometry<f64> {
        match self.0.0.as_slice() {
            [single] => geo::Geometry::Polygon(single.clone()),
            _ => geo::Geometry::MultiPolygon(self.0.clone()),
        }
    }

    /// Well-Known Text of [`Self::to_geometry`].
    #[must_use]
    pub fn to_wkt(&self) -> String {
        self.to_geometry().wkt_string()
    }

    /// Well-Known Binary of [`Self::to_geometry`], hex encoded.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Wkb`] if encoding fails.
    pub fn to_wkb_hex(&self) -> Result<String, AoiError> {
        Ok(hex::encode(encode_wkb(&self.to_geometry())?))
    }

    /// Extent of the dissolved geometry.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.0.bounding_rect()
    }

    /// Area-weighted centroid of the dissolved geometry.
    #[must_use]
    pub fn centroid(&self) -> Option<geo::Point<f64>> {
        self.0.centroid()
    }
}

fn encode_wkb(geometry: &geo::Geometry<f64>) -> Result<Vec<u8>, AoiError> {
    geometry
        .to_wkb(CoordDimensions::xy())
        .map_err(|e| AoiError::Wkb {
            message: e.to_string(),
        })
}

fn push_feature(feature: Feature, parts: &mut Vec<Polygon<f64>>) -> Result<(), AoiError> {
    match feature.geometry {
        Some(geometry) => push_polygons(geometry.try_into()?, parts),
        None => {
            log::debug!("Skipping AOI feature without geometry");
            Ok(())
        }
    }
}

fn push_polygons(geometry: geo::Geometry<f64>, parts: &mut Vec<Polygon<f64>>) -> Result<(), AoiError> {
    match geometry {
        geo::Geometry::Polygon(polygon) => parts.push(polygon),
        geo::Geometry::MultiPolygon(multi) => parts.extend(multi.0),
        geo::Geometry::Rect(rect) => parts.push(rect.to_polygon()),
        geo::Geometry::Triangle(triangle) => parts.push(triangle.to_polygon()),
        geo::Geometry::GeometryCollection(collection) => {
            for member in collection {
                push_polygons(member, parts)?;
            }
        }
        other => {
            return Err(AoiError::UnsupportedGeometry {
                kind: geometry_kind(&other).to_string(),
            });
        }
    }
    Ok(())
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Rejects a legacy `GeoJSON` `crs` member that names anything but WGS84.
fn check_crs(members: Option<&JsonObject>) -> Result<(), AoiError> {
    let Some(name) = members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(serde_json::Value::as_str)
    else {
        return Ok(());
    };

    let upper = name.to_ascii_uppercase();
    if upper.ends_with("CRS84") || upper.ends_with(":4326") {
        Ok(())
    } else {
        Err(AoiError::UnsupportedCrs {
            name: name.to_string(),
        })
    }
}
