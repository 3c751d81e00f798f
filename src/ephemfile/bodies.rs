//! Body identities for ephemeris tables
//!
//! Ephemeris tables carry one translation item per stored body, in the
//! conventional JPL development-ephemeris order. Earth, the Moon, and the
//! Earth-Moon barycenter are related through the stored EMB and geocentric
//! Moon items and are always derived, never read directly.

/// Index of a translation item within an ephemeris table record
pub type FileItem = usize;

/// Mercury's item index
pub const ITEM_MERCURY: FileItem = 0;
/// Venus's item index
pub const ITEM_VENUS: FileItem = 1;
/// Earth-Moon barycenter item index (relative to the solar-system barycenter)
pub const ITEM_EMBARY: FileItem = 2;
/// Mars's item index
pub const ITEM_MARS: FileItem = 3;
/// Jupiter's item index
pub const ITEM_JUPITER: FileItem = 4;
/// Saturn's item index
pub const ITEM_SATURN: FileItem = 5;
/// Uranus's item index
pub const ITEM_URANUS: FileItem = 6;
/// Neptune's item index
pub const ITEM_NEPTUNE: FileItem = 7;
/// Pluto's item index
pub const ITEM_PLUTO: FileItem = 8;
/// Geocentric Moon item index (relative to Earth)
pub const ITEM_MOON_GEO: FileItem = 9;
/// Sun's item index
pub const ITEM_SUN: FileItem = 10;

/// Number of translation items a standard table carries
pub const N_FILE_ITEMS: usize = 11;

/// A body whose barycentric state the codec can answer for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetBody {
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    Sun,
    Earth,
    Moon,
    EarthMoonBarycenter,
    SolarSystemBarycenter,
}

impl TargetBody {
    /// All representable bodies, in presentation order
    pub const ALL: [TargetBody; 13] = [
        TargetBody::SolarSystemBarycenter,
        TargetBody::Sun,
        TargetBody::Mercury,
        TargetBody::Venus,
        TargetBody::Earth,
        TargetBody::Moon,
        TargetBody::EarthMoonBarycenter,
        TargetBody::Mars,
        TargetBody::Jupiter,
        TargetBody::Saturn,
        TargetBody::Uranus,
        TargetBody::Neptune,
        TargetBody::Pluto,
    ];

    /// The body's name as a string
    pub fn name(&self) -> &'static str {
        match self {
            TargetBody::Mercury => "Mercury",
            TargetBody::Venus => "Venus",
            TargetBody::Mars => "Mars",
            TargetBody::Jupiter => "Jupiter",
            TargetBody::Saturn => "Saturn",
            TargetBody::Uranus => "Uranus",
            TargetBody::Neptune => "Neptune",
            TargetBody::Pluto => "Pluto",
            TargetBody::Sun => "Sun",
            TargetBody::Earth => "Earth",
            TargetBody::Moon => "Moon",
            TargetBody::EarthMoonBarycenter => "EMBary",
            TargetBody::SolarSystemBarycenter => "SSBary",
        }
    }

    /// Look up a body by name
    pub fn from_name(name: &str) -> Option<TargetBody> {
        TargetBody::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// The single file item that stores this body directly, if any.
    /// Earth, the Moon, the EMB, and the SSB have no direct item.
    pub fn direct_item(&self) -> Option<FileItem> {
        match self {
            TargetBody::Mercury => Some(ITEM_MERCURY),
            TargetBody::Venus => Some(ITEM_VENUS),
            TargetBody::Mars => Some(ITEM_MARS),
            TargetBody::Jupiter => Some(ITEM_JUPITER),
            TargetBody::Saturn => Some(ITEM_SATURN),
            TargetBody::Uranus => Some(ITEM_URANUS),
            TargetBody::Neptune => Some(ITEM_NEPTUNE),
            TargetBody::Pluto => Some(ITEM_PLUTO),
            TargetBody::Sun => Some(ITEM_SUN),
            TargetBody::Earth
            | TargetBody::Moon
            | TargetBody::EarthMoonBarycenter
            | TargetBody::SolarSystemBarycenter => None,
        }
    }

    /// File items whose coefficients must be interpolated to answer for this
    /// body. The SSB is the coordinate origin and needs none.
    pub fn required_items(&self) -> &'static [FileItem] {
        match self {
            TargetBody::Mercury => &[ITEM_MERCURY],
            TargetBody::Venus => &[ITEM_VENUS],
            TargetBody::Mars => &[ITEM_MARS],
            TargetBody::Jupiter => &[ITEM_JUPITER],
            TargetBody::Saturn => &[ITEM_SATURN],
            TargetBody::Uranus => &[ITEM_URANUS],
            TargetBody::Neptune => &[ITEM_NEPTUNE],
            TargetBody::Pluto => &[ITEM_PLUTO],
            TargetBody::Sun => &[ITEM_SUN],
            TargetBody::Earth | TargetBody::Moon => &[ITEM_EMBARY, ITEM_MOON_GEO],
            TargetBody::EarthMoonBarycenter => &[ITEM_EMBARY],
            TargetBody::SolarSystemBarycenter => &[],
        }
    }

    /// True for the Earth/Moon/EMB trio whose states are always derived
    pub fn is_earth_moon_trio(&self) -> bool {
        matches!(
            self,
            TargetBody::Earth | TargetBody::Moon | TargetBody::EarthMoonBarycenter
        )
    }
}

/// Name of a stored file item (for diagnostics and the inspection tool)
pub fn item_name(item: FileItem) -> Option<&'static str> {
    match item {
        ITEM_MERCURY => Some("Mercury"),
        ITEM_VENUS => Some("Venus"),
        ITEM_EMBARY => Some("Earth-Moon barycenter"),
        ITEM_MARS => Some("Mars"),
        ITEM_JUPITER => Some("Jupiter"),
        ITEM_SATURN => Some("Saturn"),
        ITEM_URANUS => Some("Uranus"),
        ITEM_NEPTUNE => Some("Neptune"),
        ITEM_PLUTO => Some("Pluto"),
        ITEM_MOON_GEO => Some("Moon (geocentric)"),
        ITEM_SUN => Some("Sun"),
        _ => None,
    }
}
