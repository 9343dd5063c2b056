//! A scriptable `ProtocolClient` for the core's own tests: records every
//! outbound RPC and lets a test feed events into a group's metadata/message
//! stream on demand. Grounded on the teacher's `test_harness` crate's role
//! as a dev-dependency fake driving `coreclient`'s own integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mx_common::Base64Id;
use mx_core::protocol::{
    AppMessage, GroupInfo, GroupMessageEvent, GroupMetadataEvent, MessageStream, MetadataStream, ProtocolClient,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
struct Inner {
    group_info_by_contact: HashMap<Base64Id, GroupInfo>,
    group_info_by_group: HashMap<Base64Id, GroupInfo>,
    activated_groups: Vec<Base64Id>,
    sent_messages: Vec<(Base64Id, AppMessage)>,
    metadata_receivers: HashMap<Base64Id, mpsc::UnboundedReceiver<GroupMetadataEvent>>,
    message_receivers: HashMap<Base64Id, mpsc::UnboundedReceiver<GroupMessageEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeProtocolClient {
    inner: Arc<Mutex<Inner>>,
}

impl FakeProtocolClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response to `GroupInfo(ContactPK)` for one contact.
    pub fn set_group_info_for_contact(&self, contact_pk: Base64Id, info: GroupInfo) {
        self.inner.lock().unwrap().group_info_by_contact.insert(contact_pk, info);
    }

    /// Scripts the response to `GroupInfo(GroupPK)` for one group.
    pub fn set_group_info_for_group(&self, group_pk: Base64Id, info: GroupInfo) {
        self.inner.lock().unwrap().group_info_by_group.insert(group_pk, info);
    }

    /// Registers a metadata stream for `group_pk` and returns the sender a
    /// test uses to push events into it. Must be called before the event
    /// loop subscribes to this group.
    pub fn metadata_sender(&self, group_pk: Base64Id) -> mpsc::UnboundedSender<GroupMetadataEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().metadata_receivers.insert(group_pk, rx);
        tx
    }

    /// Registers a message stream for `group_pk` and returns the sender a
    /// test uses to push events into it. Must be called before the event
    /// loop subscribes to this group.
    pub fn message_sender(&self, group_pk: Base64Id) -> mpsc::UnboundedSender<GroupMessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().message_receivers.insert(group_pk, rx);
        tx
    }

    pub fn activated_groups(&self) -> Vec<Base64Id> {
        self.inner.lock().unwrap().activated_groups.clone()
    }

    pub fn sent_messages(&self) -> Vec<(Base64Id, AppMessage)> {
        self.inner.lock().unwrap().sent_messages.clone()
    }
}

impl ProtocolClient for FakeProtocolClient {
    async fn instance_get_configuration(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn group_info_by_group(&self, group_pk: &Base64Id) -> anyhow::Result<GroupInfo> {
        self.inner
            .lock()
            .unwrap()
            .group_info_by_group
            .get(group_pk)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted GroupInfo for group {group_pk}"))
    }

    async fn group_info_by_contact(&self, contact_pk: &Base64Id) -> anyhow::Result<GroupInfo> {
        self.inner
            .lock()
            .unwrap()
            .group_info_by_contact
            .get(contact_pk)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted GroupInfo for contact {contact_pk}"))
    }

    async fn activate_group(&self, group_pk: &Base64Id) -> anyhow::Result<()> {
        self.inner.lock().unwrap().activated_groups.push(group_pk.clone());
        Ok(())
    }

    async fn app_message_send(&self, group_pk: &Base64Id, payload: AppMessage) -> anyhow::Result<()> {
        self.inner.lock().unwrap().sent_messages.push((group_pk.clone(), payload));
        Ok(())
    }

    async fn subscribe_to_metadata(&self, group_pk: &Base64Id) -> anyhow::Result<MetadataStream> {
        let receiver = self
            .inner
            .lock()
            .unwrap()
            .metadata_receivers
            .remove(group_pk)
            .ok_or_else(|| anyhow::anyhow!("no metadata stream registered for group {group_pk}"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn subscribe_to_messages(&self, group_pk: &Base64Id) -> anyhow::Result<MessageStream> {
        let receiver = self
            .inner
            .lock()
            .unwrap()
            .message_receivers
            .remove(group_pk)
            .ok_or_else(|| anyhow::anyhow!("no message stream registered for group {group_pk}"))?;
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }
}
