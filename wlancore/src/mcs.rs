//! Modulation and coding schemes, data rates and frame air times.
//!
//! Rates follow the 802.11ax single user tables: data subcarriers per channel width, bits per
//! symbol and coding rate per MCS, 16 µs HE symbols (12.8 µs plus the 3.2 µs guard interval).

use serde::{Deserialize, Serialize};

use crate::units::{DataRate, Db, Power, Time};

/// Number of channel widths an MCS table has entries for (1, 2, 4 and 8 channels).
pub const NUM_WIDTHS: usize = 4;

pub const NUM_MCS: usize = 12;

/// Best decodable MCS for each channel width, `None` where nothing can be decoded.
pub type McsPerWidth = [Option<Mcs>; NUM_WIDTHS];

/// 1 based MCS index, `Mcs(1)` is BPSK 1/2 and `Mcs(12)` is 1024-QAM 5/6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mcs(u8);

const MODULATION_BITS: [u32; NUM_MCS] = [1, 2, 2, 4, 4, 6, 6, 6, 8, 8, 10, 10];

const CODING_RATES: [f64; NUM_MCS] = [
    1.0 / 2.0,
    1.0 / 2.0,
    3.0 / 4.0,
    1.0 / 2.0,
    3.0 / 4.0,
    2.0 / 3.0,
    3.0 / 4.0,
    5.0 / 6.0,
    3.0 / 4.0,
    5.0 / 6.0,
    3.0 / 4.0,
    5.0 / 6.0,
];

/// Minimum received power per channel in dBm to decode each MCS.
const SENSITIVITY_DBM: [f64; NUM_MCS] = [
    -82.0, -79.0, -77.0, -74.0, -70.0, -66.0, -65.0, -64.0, -59.0, -57.0, -54.0, -52.0,
];

/// HE data subcarriers per width index.
const HE_SUBCARRIERS: [u32; NUM_WIDTHS] = [234, 468, 980, 1960];

/// Legacy (non-HT) data subcarriers in a 20 MHz channel, used for control frames.
const LEGACY_SUBCARRIERS: u32 = 48;

const SPATIAL_STREAMS: u32 = 1;

const HE_SYMBOL: Time = Time::from_micros(16.0);
const LEGACY_SYMBOL: Time = Time::from_micros(4.0);
const LEGACY_PREAMBLE: Time = Time::from_micros(20.0);
const HE_SU_PREAMBLE: Time = Time::from_micros(164.0);

const SERVICE_BITS: f64 = 16.0;
const TAIL_BITS: f64 = 6.0;
const MPDU_DELIMITER_BITS: f64 = 32.0;
const MAC_HEADER_BITS: f64 = 272.0;

impl Mcs {
    pub const LOWEST: Mcs = Mcs(1);
    pub const HIGHEST: Mcs = Mcs(NUM_MCS as u8);

    pub fn new(index: u8) -> Option<Mcs> {
        (1..=NUM_MCS as u8).contains(&index).then_some(Mcs(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    fn slot(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn bits_per_subcarrier(self) -> u32 {
        MODULATION_BITS[self.slot()]
    }

    pub fn coding_rate(self) -> f64 {
        CODING_RATES[self.slot()]
    }

    /// Highest MCS decodable with `power` received on each channel.
    pub fn best_for(power: Db<Power>) -> Option<Mcs> {
        let dbm = power.dbm();
        SENSITIVITY_DBM
            .iter()
            .rposition(|threshold| dbm >= *threshold)
            .map(|slot| Mcs(slot as u8 + 1))
    }

    /// HE single user data rate on `width_index` (see [`crate::channel::ChannelRange::width_index`]).
    pub fn data_rate(self, width_index: usize) -> DataRate {
        let bits_per_symbol = self.he_bits_per_symbol(width_index);
        DataRate::from_bits_per_second(bits_per_symbol / HE_SYMBOL.seconds())
    }

    fn he_bits_per_symbol(self, width_index: usize) -> f64 {
        (HE_SUBCARRIERS[width_index] * self.bits_per_subcarrier() * SPATIAL_STREAMS) as f64
            * self.coding_rate()
    }

    fn legacy_bits_per_symbol(self) -> f64 {
        (LEGACY_SUBCARRIERS * self.bits_per_subcarrier()) as f64 * self.coding_rate()
    }
}

/// What a receiver answers to an MCS request: the best MCS per width when the sender's power
/// is split evenly over 1, 2, 4 or 8 channels.
pub fn select_mcs_response(power_single_channel: Db<Power>) -> McsPerWidth {
    let mut response = [None; NUM_WIDTHS];
    for (width_index, entry) in response.iter_mut().enumerate() {
        let channels = (1u32 << width_index) as f64;
        let per_channel = power_single_channel - Db::from_unit(channels);
        *entry = Mcs::best_for(per_channel);
    }
    response
}

/// Which air time rules apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PhyTiming {
    /// Every frame lasts its length divided by the HE data rate, no preambles.
    #[default]
    NotSpecified,
    /// 802.11ax: legacy preamble and 4 µs symbols for control frames, HE-SU preamble and 16 µs
    /// symbols for DATA, whole symbols only.
    Ax,
}

/// Sizes of the four frames of an exchange, in bits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameLengths {
    pub rts: f64,
    pub cts: f64,
    pub ack: f64,
    /// Length of one data packet.
    pub packet: f64,
    /// Packets sent together in one DATA frame.
    pub aggregated: u32,
}

impl Default for FrameLengths {
    fn default() -> Self {
        Self {
            rts: 160.0,
            cts: 112.0,
            ack: 112.0,
            packet: 12000.0,
            aggregated: 1,
        }
    }
}

impl FrameLengths {
    /// Payload bits delivered by one successful DATA frame.
    pub fn payload_bits(&self) -> f64 {
        self.packet * self.aggregated as f64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameDurations {
    pub rts: Time,
    pub cts: Time,
    pub data: Time,
    pub ack: Time,
}

impl FrameDurations {
    pub const ZERO: FrameDurations = FrameDurations {
        rts: Time::ZERO,
        cts: Time::ZERO,
        data: Time::ZERO,
        ack: Time::ZERO,
    };

    pub fn compute(timing: PhyTiming, mcs: Mcs, width_index: usize, lengths: &FrameLengths) -> Self {
        match timing {
            PhyTiming::NotSpecified => {
                let rate = mcs.data_rate(width_index);
                FrameDurations {
                    rts: rate.time_for(lengths.rts),
                    cts: rate.time_for(lengths.cts),
                    data: rate.time_for(lengths.payload_bits()),
                    ack: rate.time_for(lengths.ack),
                }
            }
            PhyTiming::Ax => {
                let control = |bits: f64| {
                    let symbols = ((SERVICE_BITS + bits + TAIL_BITS) / mcs.legacy_bits_per_symbol()).ceil();
                    LEGACY_PREAMBLE + LEGACY_SYMBOL * symbols
                };

                let data_bits = SERVICE_BITS
                    + lengths.aggregated as f64
                        * (MPDU_DELIMITER_BITS + MAC_HEADER_BITS + lengths.packet)
                    + TAIL_BITS;
                let data_symbols = (data_bits / mcs.he_bits_per_symbol(width_index)).ceil();

                FrameDurations {
                    rts: control(lengths.rts),
                    cts: control(lengths.cts),
                    data: HE_SU_PREAMBLE + HE_SYMBOL * data_symbols,
                    ack: control(lengths.ack),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{assert_close, units::Dbm};

    use super::*;

    #[test]
    fn best_mcs_thresholds() {
        assert_eq!(Mcs::best_for(Dbm::from_dbm(-90.0)), None);
        assert_eq!(Mcs::best_for(Dbm::from_dbm(-82.0)), Mcs::new(1));
        assert_eq!(Mcs::best_for(Dbm::from_dbm(-75.0)), Mcs::new(3));
        assert_eq!(Mcs::best_for(Dbm::from_dbm(-52.0)), Mcs::new(12));
        assert_eq!(Mcs::best_for(Dbm::from_dbm(-10.0)), Some(Mcs::HIGHEST));
    }

    #[test]
    fn response_degrades_with_width() {
        let response = select_mcs_response(Dbm::from_dbm(-76.0));
        assert_eq!(response, [Mcs::new(3), Mcs::new(1), None, None]);

        let strong = select_mcs_response(Dbm::from_dbm(-40.0));
        assert!(strong.iter().all(|x| *x == Some(Mcs::HIGHEST)));

        for window in response.windows(2) {
            assert!(window[0] >= window[1]);
        }
    }

    #[test]
    fn mcs_bounds() {
        assert_eq!(Mcs::new(0), None);
        assert_eq!(Mcs::new(13), None);
        assert_eq!(Mcs::new(12), Some(Mcs::HIGHEST));
    }

    #[test]
    fn he_rates() {
        // 234 subcarriers, 1024-QAM 5/6 over 16 µs
        assert_close(
            Mcs::HIGHEST.data_rate(0),
            DataRate::from_bits_per_second(121.875e6),
        );
        assert_close(
            Mcs::LOWEST.data_rate(3),
            DataRate::from_bits_per_second(61.25e6),
        );
    }

    #[test]
    fn unspecified_durations_are_length_over_rate() {
        let lengths = FrameLengths {
            aggregated: 4,
            ..Default::default()
        };
        let mcs = Mcs::LOWEST;
        let rate = mcs.data_rate(0).bits_per_second();

        let durations = FrameDurations::compute(PhyTiming::NotSpecified, mcs, 0, &lengths);
        assert_close(durations.rts, Time::from_seconds(160.0 / rate));
        assert_close(durations.data, Time::from_seconds(48000.0 / rate));
    }

    #[test]
    fn ax_durations_whole_symbols() {
        let durations =
            FrameDurations::compute(PhyTiming::Ax, Mcs::LOWEST, 0, &FrameLengths::default());

        // 24 bits per legacy symbol: (16 + 160 + 6) / 24 → 8 symbols
        assert_close(durations.rts, Time::from_micros(20.0 + 8.0 * 4.0));
        // (16 + 112 + 6) / 24 → 6 symbols
        assert_close(durations.cts, Time::from_micros(44.0));
        // (16 + 32 + 272 + 12000 + 6) / 117 → 106 symbols
        assert_close(durations.data, Time::from_micros(164.0 + 106.0 * 16.0));
    }
}
