/// A connect-or-disconnect request awaiting action by a BLE worker
/// (spec §3 `Intent`). Keyed by `PatchId` in the `mac_address_update`
/// mailbox; removed once a worker has acted on it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Intent {
    Connect,
    Disconnect,
}
