use mockall::mock;
use recon_engine::traits::{CaptureRequest, CaptureResponse, PaymentProcessor, ProcessorError};

mock! {
    pub Processor {}
    impl PaymentProcessor for Processor {
        fn name(&self) -> &str;
        async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResponse, ProcessorError>;
        async fn cancel(&self, gateway_txn_id: &str) -> Result<(), ProcessorError>;
    }
}
