//! Transport seam between the SWD/DP/AP engine and whatever performs a
//! single `DAP_Transfer` round trip: the real probe in production, a
//! scripted mock in tests.

use dap_transport::commands::{TransferRequest, TransferResponse};
use dap_transport::{HidBackend, ProbeSession};

pub trait TransferTransport {
    fn transfer(&mut self, request: TransferRequest) -> dap_transport::Result<TransferResponse>;
}

impl<H: HidBackend> TransferTransport for ProbeSession<H> {
    fn transfer(&mut self, request: TransferRequest) -> dap_transport::Result<TransferResponse> {
        self.transact(request)
    }
}
