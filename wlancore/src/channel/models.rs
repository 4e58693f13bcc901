use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::units::*;

macro_rules! pathloss_model {
    ($($variant:ident),+) => {

        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub enum PathlossModel {
            $(
                $variant($variant),
            )*
        }

        impl PathlossModel {
            pub fn power_at_receiver(
                &self,
                sender_power: Db<Power>,
                frequency: Frequency,
                distance: Length,
            ) -> Db<Power>{
                match self {
                    $(
                        PathlossModel::$variant(inner) => inner.power_at_receiver(sender_power, frequency, distance),
                    )*
                }
            }
        }

        $(
        impl From<$variant> for PathlossModel {
            fn from(value: $variant) -> Self {
                PathlossModel::$variant(value)
            }
        }
        )*
    };
}

pathloss_model!(AdjustedFreeSpacePathLoss, OkumuraHata, IndoorOffice);

impl Default for PathlossModel {
    fn default() -> Self {
        free_space_path_loss().into()
    }
}

trait ImplPathlossModel {
    fn power_at_receiver(
        &self,
        sender_power: Db<Power>,
        frequency: Frequency,
        distance: Length,
    ) -> Db<Power>;
}

/// Standard free space path loss with custom distance exponent
/// <https://en.wikipedia.org/wiki/Free-space_path_loss>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdjustedFreeSpacePathLoss {
    /// Normally 2.0
    pub distance_exponent: f64,

    /// Adjustment term representing any other
    /// losses or gains in the system
    /// real or effective.
    pub other_loss_or_gain: Db<f64>,
}

pub fn free_space_path_loss() -> AdjustedFreeSpacePathLoss {
    AdjustedFreeSpacePathLoss {
        distance_exponent: 2.0,
        other_loss_or_gain: 0.0.into(),
    }
}

impl ImplPathlossModel for AdjustedFreeSpacePathLoss {
    fn power_at_receiver(
        &self,
        sender_power: Db<Power>,
        frequency: Frequency,
        distance: Length,
    ) -> Db<Power> {
        let loss = self.distance_exponent * Db::from_unit(distance)
            + 2.0 * Dbf::from_unit(4.0 * PI)
            - 2.0 * Db::from_unit(frequency.light_wavelength())
            + self.other_loss_or_gain;

        sender_power - loss
    }
}

/// Okumura-Hata loss for urban areas (small and medium cities).
/// <https://en.wikipedia.org/wiki/Hata_model>
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OkumuraHata {
    pub base_station_height: Length,
    pub mobile_height: Length,
}

impl Default for OkumuraHata {
    fn default() -> Self {
        Self {
            base_station_height: Length::from_metres(10.0),
            mobile_height: Length::from_metres(1.5),
        }
    }
}

impl ImplPathlossModel for OkumuraHata {
    fn power_at_receiver(
        &self,
        sender_power: Db<Power>,
        frequency: Frequency,
        distance: Length,
    ) -> Db<Power> {
        let f = frequency.MHz().log10();
        let hb = self.base_station_height.metres().log10();
        let hm = self.mobile_height.metres();

        let mobile_correction = (1.1 * f - 0.7) * hm - (1.56 * f - 0.8);
        let loss = 69.55 + 26.16 * f - 13.82 * hb - mobile_correction
            + (44.9 - 6.55 * hb) * distance.km().log10();

        sender_power - Dbf::from_db_value(loss)
    }
}

/// Office building model from the 802.11ax evaluation methodology:
/// free space up to a breakpoint, a steeper slope after it, plus a fixed wall loss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndoorOffice {
    pub breakpoint: Length,
    pub exponent_after_breakpoint: f64,
    pub wall_loss: Dbf,
}

impl Default for IndoorOffice {
    fn default() -> Self {
        Self {
            breakpoint: Length::from_metres(10.0),
            exponent_after_breakpoint: 3.5,
            wall_loss: Dbf::from_db_value(7.0),
        }
    }
}

impl ImplPathlossModel for IndoorOffice {
    fn power_at_receiver(
        &self,
        sender_power: Db<Power>,
        frequency: Frequency,
        distance: Length,
    ) -> Db<Power> {
        let near = distance.min(self.breakpoint);

        let mut loss = 40.05 + 20.0 * (frequency.GHz() / 2.4).log10() + 20.0 * near.metres().log10();
        if distance > self.breakpoint {
            loss += 10.0 * self.exponent_after_breakpoint * (distance / self.breakpoint).log10();
        }

        sender_power - Dbf::from_db_value(loss) - self.wall_loss
    }
}

/// How much of a transmission leaks into channels outside its nominal range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AdjacentChannelModel {
    /// Power stays inside the range.
    #[default]
    None,
    /// Only the channels directly next to the range are hit.
    Boundary,
    /// Every channel is hit, attenuated by distance to the range.
    Extreme,
}

/// Attenuation per channel of separation from the nominal range.
pub const ADJACENT_CHANNEL_ATTENUATION: Dbf = Dbf::from_db_value(20.0);

impl AdjacentChannelModel {
    /// Attenuation for a channel `separation` channels away from the range, `None` if nothing leaks.
    /// A separation of 0 means inside the range.
    pub fn leakage(self, separation: usize) -> Option<Dbf> {
        if separation == 0 {
            return Some(Dbf::from_db_value(0.0));
        }

        match self {
            AdjacentChannelModel::None => None,
            AdjacentChannelModel::Boundary => {
                (separation == 1).then_some(ADJACENT_CHANNEL_ATTENUATION)
            }
            AdjacentChannelModel::Extreme => Some(ADJACENT_CHANNEL_ATTENUATION * separation as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        assert_close,
        units::{Dbf, Dbm, Frequency, Length},
    };

    use super::*;

    #[test]
    fn standard_free_space() {
        let model = free_space_path_loss();

        let in_power = Dbm::from_dbm(20.0);
        let result = model.power_at_receiver(
            in_power,
            Frequency::from_GHz(5.0),
            Length::from_metres(100.0),
        );

        let reference = in_power - Dbf::from_db_value(86.42979);

        assert_close(result, reference);
    }

    #[test]
    fn quasi_free_space() {
        let model = AdjustedFreeSpacePathLoss {
            distance_exponent: 3.5,
            other_loss_or_gain: 0.0.into(),
        };

        let in_power = Dbm::from_dbm(20.0);
        let result = model.power_at_receiver(
            in_power,
            Frequency::from_GHz(5.0),
            Length::from_metres(100.0),
        );

        let reference = in_power - Dbf::from_db_value(116.42979);

        assert_close(result, reference);
    }

    #[test]
    fn hata_grows_with_distance() {
        let model = OkumuraHata::default();
        let near = model.power_at_receiver(
            Dbm::from_dbm(20.0),
            Frequency::from_MHz(900.0),
            Length::from_metres(500.0),
        );
        let far = model.power_at_receiver(
            Dbm::from_dbm(20.0),
            Frequency::from_MHz(900.0),
            Length::from_metres(5000.0),
        );

        // One decade of distance costs the slope term
        let slope = 44.9 - 6.55 * 10f64.log10();
        assert_close(near.dbm() - far.dbm(), slope);
    }

    #[test]
    fn indoor_breakpoint() {
        let model = IndoorOffice {
            wall_loss: Dbf::from_db_value(0.0),
            ..Default::default()
        };
        let at = |d: f64| {
            model
                .power_at_receiver(
                    Dbm::from_dbm(0.0),
                    Frequency::from_GHz(2.4),
                    Length::from_metres(d),
                )
                .dbm()
        };

        assert_close(at(1.0), -40.05);
        assert_close(at(10.0), -60.05);
        assert_close(at(100.0), -95.05);
    }

    #[test]
    fn leakage_models() {
        assert_eq!(AdjacentChannelModel::None.leakage(1), None);
        assert_eq!(
            AdjacentChannelModel::Boundary.leakage(1),
            Some(ADJACENT_CHANNEL_ATTENUATION)
        );
        assert_eq!(AdjacentChannelModel::Boundary.leakage(2), None);
        assert_eq!(
            AdjacentChannelModel::Extreme.leakage(3),
            Some(Dbf::from_db_value(60.0))
        );
        for model in [
            AdjacentChannelModel::None,
            AdjacentChannelModel::Boundary,
            AdjacentChannelModel::Extreme,
        ] {
            assert_eq!(model.leakage(0), Some(Dbf::from_db_value(0.0)));
        }
    }
}
