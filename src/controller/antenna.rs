//! Antenna selection for the RSP2, RSPdx and RSPduo.

use crate::{
    api::{
        ReasonForUpdate,
        ReasonForUpdateExt1,
    },
    capabilities::{
        AntennaKind,
        Change,
        RSP2_ANTENNAS,
        RSPDX_ANTENNAS,
    },
    controller::Rsp,
};

impl Rsp {
    /// Antennas that can be selected. Empty for single antenna models.
    pub fn antennas(&self) -> Vec<&'static str> {
        match self.capabilities.antennas {
            AntennaKind::Fixed => vec![],
            AntennaKind::Rsp2 => RSP2_ANTENNAS.iter().map(|antenna| antenna.name).collect(),
            AntennaKind::RspDx => RSPDX_ANTENNAS.iter().map(|(name, _)| *name).collect(),
            AntennaKind::RspDuo => self.rspduo_antennas(),
        }
    }

    pub fn antenna(&self) -> &'static str {
        match self.capabilities.antennas {
            AntennaKind::Fixed => "Unknown",
            AntennaKind::Rsp2 => {
                let rsp2 = &self.params.rx_channel(self.tuner()).rsp2_tuner;
                RSP2_ANTENNAS
                    .iter()
                    .find(|antenna| {
                        antenna.antenna_sel == rsp2.antenna_sel
                            && antenna.am_port_sel == rsp2.am_port_sel
                    })
                    .map_or("Unknown", |antenna| antenna.name)
            }
            AntennaKind::RspDx => {
                let Some(dev) = &self.params.dev
                else {
                    return "Unknown";
                };
                RSPDX_ANTENNAS
                    .iter()
                    .find(|(_, antenna_sel)| *antenna_sel == dev.rspdx.antenna_sel)
                    .map_or("Unknown", |(name, _)| *name)
            }
            AntennaKind::RspDuo => self.rspduo_antenna(),
        }
    }

    /// Selects an antenna by name. Returns the antenna in use afterwards.
    pub fn set_antenna(&mut self, name: &str) -> &'static str {
        match self.capabilities.antennas {
            AntennaKind::Fixed => {
                tracing::warn!(
                    model = self.capabilities.model.name(),
                    "antenna selection not supported"
                );
            }
            AntennaKind::Rsp2 => self.set_rsp2_antenna(name),
            AntennaKind::RspDx => self.set_rspdx_antenna(name),
            AntennaKind::RspDuo => {
                self.set_rspduo_antenna(name);
            }
        }
        self.antenna()
    }

    /// Antenna select and AM port go out in one update.
    fn set_rsp2_antenna(&mut self, name: &str) {
        let Some(antenna) = RSP2_ANTENNAS.iter().find(|antenna| antenna.name == name)
        else {
            tracing::warn!(antenna = name, "invalid antenna");
            return;
        };

        let tuner = self.tuner();
        let rsp2 = &mut self.params.rx_channel_mut(tuner).rsp2_tuner;
        let mut change = Change::NONE;
        if rsp2.antenna_sel != antenna.antenna_sel {
            rsp2.antenna_sel = antenna.antenna_sel;
            change |= ReasonForUpdate::RSP2_ANTENNA_CONTROL;
        }
        if rsp2.am_port_sel != antenna.am_port_sel {
            rsp2.am_port_sel = antenna.am_port_sel;
            change |= ReasonForUpdate::RSP2_AM_PORT_SELECT;
        }
        self.apply(change, tuner);
    }

    fn set_rspdx_antenna(&mut self, name: &str) {
        let Some((_, antenna_sel)) = RSPDX_ANTENNAS
            .iter()
            .find(|(antenna, _)| *antenna == name)
        else {
            tracing::warn!(antenna = name, "invalid antenna");
            return;
        };

        let tuner = self.tuner();
        let Some(dev) = &mut self.params.dev
        else {
            return;
        };
        if dev.rspdx.antenna_sel != *antenna_sel {
            dev.rspdx.antenna_sel = *antenna_sel;
            self.apply(
                Change::ext1(ReasonForUpdateExt1::RSPDX_ANTENNA_CONTROL),
                tuner,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        RspOptions,
        api::{
            HwVersion,
            ReasonForUpdate,
            ReasonForUpdateExt1,
            Rsp2AmPortSelect,
            RspDxAntennaSelect,
            sim::SimulatedApi,
        },
        capabilities::Model,
        controller::tests::{
            open_with,
            stream,
        },
    };

    #[test]
    fn single_antenna_models_list_none() {
        let api = SimulatedApi::new().with_device(HwVersion::RSP1A, "1A0001");
        let (_api, mut rsp) = open_with(api, Model::Rsp1a, RspOptions::default());
        assert!(rsp.antennas().is_empty());
        assert_eq!(rsp.set_antenna("Antenna A"), "Unknown");
    }

    #[test]
    fn rsp2_hi_z_switches_antenna_and_port_together() {
        let api = SimulatedApi::new().with_device(HwVersion::RSP2, "2B0001");
        let (api, mut rsp) = open_with(api, Model::Rsp2, RspOptions::default());
        assert_eq!(rsp.antennas(), ["Antenna A", "Antenna B", "Hi-Z"]);
        assert_eq!(rsp.antenna(), "Antenna A");
        stream(&mut rsp);

        assert_eq!(rsp.set_antenna("Antenna B"), "Antenna B");
        assert_eq!(rsp.set_antenna("Hi-Z"), "Hi-Z");
        assert_eq!(
            rsp.params().rx_channel_a.rsp2_tuner.am_port_sel,
            Rsp2AmPortSelect::Port1
        );

        let updates = api.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].reason, ReasonForUpdate::RSP2_ANTENNA_CONTROL);
        assert_eq!(
            updates[1].reason,
            ReasonForUpdate::RSP2_ANTENNA_CONTROL | ReasonForUpdate::RSP2_AM_PORT_SELECT
        );
    }

    #[test]
    fn rsp2_hi_z_uses_its_own_gain_table() {
        let api = SimulatedApi::new().with_device(HwVersion::RSP2, "2B0001");
        let (_api, mut rsp) = open_with(api, Model::Rsp2, RspOptions::default());
        rsp.set_center_freq(10e6);
        assert_eq!(rsp.gain_range("LNAstate").max, 8.0);
        rsp.set_antenna("Hi-Z");
        assert_eq!(rsp.gain_range("LNAstate").max, 4.0);
    }

    #[test]
    fn unknown_antenna_is_ignored() {
        let api = SimulatedApi::new().with_device(HwVersion::RSP2, "2B0001");
        let (api, mut rsp) = open_with(api, Model::Rsp2, RspOptions::default());
        stream(&mut rsp);
        assert_eq!(rsp.set_antenna("Antenna Z"), "Antenna A");
        assert!(api.updates().is_empty());
    }

    #[test]
    fn rspdx_antenna_lives_in_device_params() {
        let api = SimulatedApi::new().with_device(HwVersion::RSPDX, "DX0001");
        let (api, mut rsp) = open_with(api, Model::RspDx, RspOptions::default());
        stream(&mut rsp);

        assert_eq!(rsp.set_antenna("Antenna C"), "Antenna C");
        assert_eq!(
            rsp.params().dev.unwrap().rspdx.antenna_sel,
            RspDxAntennaSelect::C
        );
        let updates = api.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].reason_ext1, ReasonForUpdateExt1::RSPDX_ANTENNA_CONTROL);
    }
}
