use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::region::{Geometry, Region};

/// Stream used for simulated land-cover composition.
pub const LAND_COVER_STREAM: &str = "land_cover";
/// Stream used for groundwater depth and surface-water distance.
pub const WATER_ACCESS_STREAM: &str = "water_access";
/// Stream used for simulated air-quality figures.
pub const AIR_QUALITY_STREAM: &str = "air_quality";

/// Seeded source of every simulated figure in a region fetch.
///
/// Land cover, water access and air quality each draw from their own named
/// stream, created lazily from the master generator in first-use order.
/// Adding draws to one stream never shifts the values another produces.
///
/// [`RngManager::for_region`] keys the master seed on the region's shape, so
/// one scenario seed gives every region its own repeatable figures.
pub struct RngManager {
    master: ChaCha8Rng,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master: ChaCha8Rng::seed_from_u64(seed),
            streams: HashMap::new(),
        }
    }

    /// Generator for one region's fetch. Only the geometry feeds the key;
    /// the region's id and name do not.
    pub fn for_region(seed: u64, region: &Region) -> Self {
        Self::new(seed ^ geometry_key(&region.geometry))
    }

    pub fn stream(&mut self, name: &str) -> SampleRng<'_> {
        let master = &mut self.master;
        let entry = self.streams.entry(name.to_string()).or_insert_with(|| {
            let mut seed_bytes = [0u8; 8];
            master.fill_bytes(&mut seed_bytes);
            ChaCha8Rng::seed_from_u64(u64::from_le_bytes(seed_bytes))
        });
        SampleRng { inner: entry }
    }
}

/// FNV-1a over the geometry's tag and coordinate bits.
fn geometry_key(geometry: &Geometry) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let words: Vec<u64> = match geometry {
        Geometry::Polygon { ring } => ring
            .iter()
            .flat_map(|c| [c.lat.to_bits(), c.lng.to_bits()])
            .collect(),
        Geometry::Rectangle {
            south_west,
            north_east,
        } => vec![
            south_west.lat.to_bits(),
            south_west.lng.to_bits(),
            north_east.lat.to_bits(),
            north_east.lng.to_bits(),
        ],
        Geometry::Circle { center, radius_m } => vec![
            center.lat.to_bits(),
            center.lng.to_bits(),
            radius_m.to_bits(),
        ],
    };

    geometry
        .kind()
        .bytes()
        .chain(words.iter().flat_map(|w| w.to_le_bytes()))
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Mutable view of one named stream.
pub struct SampleRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl<'a> RngCore for SampleRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
