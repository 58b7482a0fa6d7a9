use crate::lang::Prim;

/// Everything the datapath knows about a flow at the moment an ack arrives.
/// Times are in microseconds, rates in bytes per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Primitives {
    pub bytes_acked: u64,
    pub packets_acked: u64,
    pub bytes_misordered: u64,
    pub packets_misordered: u64,
    pub lost_pkts_sample: u64,
    pub ecn_packets: u64,
    pub now: u64,
    pub bytes_in_flight: u64,
    pub packets_in_flight: u64,
    pub bytes_pending: u64,
    pub rate_incoming: u64,
    pub rate_outgoing: u64,
    pub rtt_sample_us: u64,
    pub was_timeout: bool,
}

impl Primitives {
    pub fn get(&self, p: Prim) -> u64 {
        match p {
            Prim::AckBytesAcked => self.bytes_acked,
            Prim::AckPacketsAcked => self.packets_acked,
            Prim::AckBytesMisordered => self.bytes_misordered,
            Prim::AckPacketsMisordered => self.packets_misordered,
            Prim::AckLostPktsSample => self.lost_pkts_sample,
            Prim::AckEcnPackets => self.ecn_packets,
            Prim::AckNow => self.now,
            Prim::FlowBytesInFlight => self.bytes_in_flight,
            Prim::FlowPacketsInFlight => self.packets_in_flight,
            Prim::FlowBytesPending => self.bytes_pending,
            Prim::FlowRateIncoming => self.rate_incoming,
            Prim::FlowRateOutgoing => self.rate_outgoing,
            Prim::FlowRttSampleUs => self.rtt_sample_us,
            Prim::FlowWasTimeout => u64::from(self.was_timeout),
        }
    }
}
