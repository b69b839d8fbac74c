//! Idle-session sweeper behavior over a live listener.

mod common;

use common::{TestClient, TestServerBuilder};
use corral_core::Status;
use corral_signer::KeyPair;
use std::time::Duration;

#[tokio::test]
async fn idle_session_is_evicted_and_device_readmittable() {
    let server = TestServerBuilder::new().with_sweeper(1, 1).start().await;
    let keypair = KeyPair::generate();

    let _idle = TestClient::login(server.addr, "alice", "1", &keypair).await;

    // While the session is fresh, a second admission is refused.
    let mut second = TestClient::connect(server.addr).await;
    let (_, auth) = second.authenticate("alice", &keypair).await;
    assert_eq!(auth, Status::Ok);
    assert_eq!(second.admit("1").await, Status::NokDevid);

    // Leave the first session idle past the threshold; the sweeper
    // reflects it as offline and the same id becomes admittable.
    let mut admitted = Status::NokDevid;
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        admitted = second.admit("1").await;
        if admitted == Status::OkDevid {
            break;
        }
    }
    assert_eq!(admitted, Status::OkDevid);
}
