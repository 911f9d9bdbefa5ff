//! SAME/EAS originator and event codes

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use strum::EnumMessage;
use thiserror::Error;

/// SAME message originator code
///
/// Originator codes are constructed with [`from_code`](Self::from_code)
/// from their SAME string representation; unknown codes map to
/// [`Originator::Unknown`] rather than failing, since receivers are
/// required to accept any originator.
///
/// ```
/// use sirenrx::Originator;
///
/// assert_eq!(Originator::WeatherService, Originator::from_code("WXR"));
/// assert_eq!("WXR", Originator::WeatherService.as_str());
/// assert_eq!(Originator::Unknown, Originator::from_code("HUH"));
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::EnumMessage, strum_macros::EnumString,
)]
pub enum Originator {
    /// An unknown (and probably invalid) originator code
    #[strum(serialize = "OOO", detailed_message = "Unknown Originator")]
    Unknown,

    /// Primary Entry Point station for national activations
    #[strum(serialize = "PEP", detailed_message = "Primary Entry Point System")]
    PrimaryEntryPoint,

    /// Civil authorities
    #[strum(serialize = "CIV", detailed_message = "Civil authorities")]
    CivilAuthority,

    /// National Weather Service or Environment Canada
    #[strum(serialize = "WXR", detailed_message = "National Weather Service")]
    WeatherService,

    /// EAS participant, usually a broadcast station
    #[strum(
        serialize = "EAS",
        detailed_message = "Broadcast station or cable system"
    )]
    BroadcastStation,
}

impl Originator {
    /// Decode a three-character originator code
    ///
    /// Codes not in the table yield [`Originator::Unknown`]. This is an
    /// inherent constructor, not `From<&str>`: the `EnumString` derive
    /// already provides `TryFrom<&str>`, and a `From` impl conflicts
    /// with it.
    pub fn from_code(code: &str) -> Self {
        Originator::from_str(code).unwrap_or(Originator::Unknown)
    }

    /// Human-readable description
    pub fn as_display_str(&self) -> &'static str {
        self.get_detailed_message().expect("missing definition")
    }

    /// Three-character SAME code
    pub fn as_str(&self) -> &'static str {
        self.get_serializations()[0]
    }
}

impl AsRef<str> for Originator {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_display_str().fmt(f)
    }
}

/// Message significance level
///
/// Levels are `Ord`: tests and statements sort below watches, and
/// watches below warnings. This is the usual basis for deciding how
/// loudly to notify.
///
/// ```
/// use sirenrx::SignificanceLevel;
///
/// assert!(SignificanceLevel::Test < SignificanceLevel::Warning);
/// assert!(SignificanceLevel::Watch < SignificanceLevel::Warning);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignificanceLevel {
    /// A test transmission
    Test,

    /// Informational statement; no significant hazard
    Statement,

    /// Conditions are favorable for the hazard
    Watch,

    /// The hazard is occurring or imminent; protective action required
    Warning,
}

impl SignificanceLevel {
    /// Single-character SAME representation
    ///
    /// Most (not all) SAME event codes end in their significance level.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignificanceLevel::Test => "T",
            SignificanceLevel::Statement => "S",
            SignificanceLevel::Watch => "A",
            SignificanceLevel::Warning => "W",
        }
    }
}

impl fmt::Display for SignificanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignificanceLevel::Test => "Test".fmt(f),
            SignificanceLevel::Statement => "Statement".fmt(f),
            SignificanceLevel::Watch => "Watch".fmt(f),
            SignificanceLevel::Warning => "Warning".fmt(f),
        }
    }
}

/// An event code we don't have in our table
///
/// The header may still be perfectly valid; receivers must tolerate
/// codes added after they shipped. When the code's last character
/// matches a known significance level, it is reported here so the
/// caller can still react appropriately.
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnknownEventCode {
    /// Unknown code, but the trailing significance character parsed
    #[error("unknown event code at significance level {0}")]
    WithSignificance(SignificanceLevel),

    /// Completely unrecognized code
    #[error("unrecognized event code")]
    Unrecognized,
}

impl From<&str> for UnknownEventCode {
    fn from(code: &str) -> Self {
        match code.as_bytes().last() {
            Some(b'T') => Self::WithSignificance(SignificanceLevel::Test),
            Some(b'S') => Self::WithSignificance(SignificanceLevel::Statement),
            Some(b'A') => Self::WithSignificance(SignificanceLevel::Watch),
            Some(b'W') => Self::WithSignificance(SignificanceLevel::Warning),
            _ => Self::Unrecognized,
        }
    }
}

/// SAME event code
///
/// The table covers the national codes in common use; it is not
/// exhaustive. Conversions from unknown strings fail with an
/// [`UnknownEventCode`] which preserves the significance level when
/// possible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "title_case")]
pub enum EventCode {
    EmergencyActionNotification,
    NationalInformationCenter,
    NationalPeriodicTest,
    PracticeDemoWarning,
    RequiredMonthlyTest,
    RequiredWeeklyTest,
    AdministrativeMessage,
    AvalancheWarning,
    BlizzardWarning,
    ChildAbductionEmergency,
    CivilDangerWarning,
    CivilEmergencyMessage,
    CoastalFloodWarning,
    CoastalFloodWatch,
    DustStormWarning,
    EarthquakeWarning,
    EvacuationImmediate,
    ExtremeWindWarning,
    FireWarning,
    FlashFloodWarning,
    FlashFloodWatch,
    FloodWarning,
    FloodWatch,
    HazardousMaterialsWarning,
    HighWindWarning,
    HighWindWatch,
    HurricaneWarning,
    HurricaneWatch,
    LawEnforcementWarning,
    LocalAreaEmergency,
    NetworkMessageNotification,
    NuclearPowerPlantWarning,
    RadiologicalHazardWarning,
    SevereThunderstormWarning,
    SevereThunderstormWatch,
    SevereWeatherStatement,
    ShelterInPlaceWarning,
    SpecialMarineWarning,
    SpecialWeatherStatement,
    StormSurgeWarning,
    StormSurgeWatch,
    TornadoWarning,
    TornadoWatch,
    TropicalStormWarning,
    TropicalStormWatch,
    TsunamiWarning,
    TsunamiWatch,
    VolcanoWarning,
    WinterStormWarning,
    WinterStormWatch,
}

// Three-letter wire code → event. phf gives us a compile-time map with
// no startup cost.
static EVENT_CODES: phf::Map<&'static str, EventCode> = phf::phf_map! {
    "EAN" => EventCode::EmergencyActionNotification,
    "NIC" => EventCode::NationalInformationCenter,
    "NPT" => EventCode::NationalPeriodicTest,
    "DMO" => EventCode::PracticeDemoWarning,
    "RMT" => EventCode::RequiredMonthlyTest,
    "RWT" => EventCode::RequiredWeeklyTest,
    "ADR" => EventCode::AdministrativeMessage,
    "AVW" => EventCode::AvalancheWarning,
    "BZW" => EventCode::BlizzardWarning,
    "CAE" => EventCode::ChildAbductionEmergency,
    "CDW" => EventCode::CivilDangerWarning,
    "CEM" => EventCode::CivilEmergencyMessage,
    "CFW" => EventCode::CoastalFloodWarning,
    "CFA" => EventCode::CoastalFloodWatch,
    "DSW" => EventCode::DustStormWarning,
    "EQW" => EventCode::EarthquakeWarning,
    "EVI" => EventCode::EvacuationImmediate,
    "EWW" => EventCode::ExtremeWindWarning,
    "FRW" => EventCode::FireWarning,
    "FFW" => EventCode::FlashFloodWarning,
    "FFA" => EventCode::FlashFloodWatch,
    "FLW" => EventCode::FloodWarning,
    "FLA" => EventCode::FloodWatch,
    "HMW" => EventCode::HazardousMaterialsWarning,
    "HWW" => EventCode::HighWindWarning,
    "HWA" => EventCode::HighWindWatch,
    "HUW" => EventCode::HurricaneWarning,
    "HUA" => EventCode::HurricaneWatch,
    "LEW" => EventCode::LawEnforcementWarning,
    "LAE" => EventCode::LocalAreaEmergency,
    "NMN" => EventCode::NetworkMessageNotification,
    "NUW" => EventCode::NuclearPowerPlantWarning,
    "RHW" => EventCode::RadiologicalHazardWarning,
    "SVR" => EventCode::SevereThunderstormWarning,
    "SVA" => EventCode::SevereThunderstormWatch,
    "SVS" => EventCode::SevereWeatherStatement,
    "SPW" => EventCode::ShelterInPlaceWarning,
    "SMW" => EventCode::SpecialMarineWarning,
    "SPS" => EventCode::SpecialWeatherStatement,
    "SSW" => EventCode::StormSurgeWarning,
    "SSA" => EventCode::StormSurgeWatch,
    "TOR" => EventCode::TornadoWarning,
    "TOA" => EventCode::TornadoWatch,
    "TRW" => EventCode::TropicalStormWarning,
    "TRA" => EventCode::TropicalStormWatch,
    "TSW" => EventCode::TsunamiWarning,
    "TSA" => EventCode::TsunamiWatch,
    "VOW" => EventCode::VolcanoWarning,
    "WSW" => EventCode::WinterStormWarning,
    "WSA" => EventCode::WinterStormWatch,
};

impl EventCode {
    /// Significance level of this event
    ///
    /// The mapping is by the event's true severity, not by its trailing
    /// character; `TOR` and `SVR` are warnings despite their spelling.
    pub fn to_significance_level(&self) -> SignificanceLevel {
        use EventCode::*;
        match self {
            NationalPeriodicTest | PracticeDemoWarning | RequiredMonthlyTest
            | RequiredWeeklyTest => SignificanceLevel::Test,
            AdministrativeMessage
            | NationalInformationCenter
            | NetworkMessageNotification
            | SevereWeatherStatement
            | SpecialWeatherStatement => SignificanceLevel::Statement,
            CoastalFloodWatch | FlashFloodWatch | FloodWatch | HighWindWatch | HurricaneWatch
            | SevereThunderstormWatch | StormSurgeWatch | TornadoWatch | TropicalStormWatch
            | TsunamiWatch => SignificanceLevel::Watch,
            _ => SignificanceLevel::Warning,
        }
    }
}

impl TryFrom<&str> for EventCode {
    type Error = UnknownEventCode;

    fn try_from(inp: &str) -> Result<Self, Self::Error> {
        EVENT_CODES
            .get(inp)
            .copied()
            .ok_or_else(|| UnknownEventCode::from(inp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_originator() {
        assert_eq!(Originator::WeatherService, Originator::from_code("WXR"));
        assert_eq!(Originator::Unknown, Originator::from_code("XYZ"));
        // the derived TryFrom must coexist with the constructor
        assert_eq!(Ok(Originator::WeatherService), Originator::try_from("WXR"));
        assert_eq!("National Weather Service", format!("{}", Originator::WeatherService));
    }

    #[test]
    fn test_event_lookup() {
        assert_eq!(
            EventCode::RequiredWeeklyTest,
            EventCode::try_from("RWT").unwrap()
        );
        assert_eq!(
            EventCode::TornadoWarning,
            EventCode::try_from("TOR").unwrap()
        );

        // unknown code with a parseable significance
        assert_eq!(
            Err(UnknownEventCode::WithSignificance(
                SignificanceLevel::Warning
            )),
            EventCode::try_from("XXW")
        );
        assert_eq!(
            Err(UnknownEventCode::Unrecognized),
            EventCode::try_from("XY9")
        );

        assert_eq!(
            "Required Weekly Test",
            EventCode::RequiredWeeklyTest.to_string()
        );
    }

    #[test]
    fn test_significance_ordering() {
        assert!(
            EventCode::RequiredWeeklyTest.to_significance_level()
                < EventCode::TornadoWatch.to_significance_level()
        );
        assert_eq!(
            SignificanceLevel::Warning,
            EventCode::TornadoWarning.to_significance_level()
        );
        assert_eq!(
            SignificanceLevel::Warning,
            EventCode::SevereThunderstormWarning.to_significance_level()
        );
    }
}
