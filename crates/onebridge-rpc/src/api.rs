//! Typed wrappers around the OneBot v11 actions the adapter uses.
//!
//! Each method builds the action's parameter object, runs it through the
//! wrapped [`Caller`], and decodes `data` into a protocol type. Optional
//! parameters that are `None` are left out of the request entirely.

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use onebridge_protocol::{
    DownloadedFile, FriendInfo, GroupInfo, GroupMemberInfo, LoginInfo, MessageEvent, MessageId,
    Segment, StrangerInfo,
};

use crate::{Caller, RpcError};

/// `get_group_msg_history` wraps its list in an object.
#[derive(serde::Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<MessageEvent>,
}

/// Drops `null` members so absent options are not sent at all.
fn compact(params: Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}

/// Typed access to a bot's actions over any [`Caller`].
#[derive(Debug, Clone)]
pub struct Api<C> {
    caller: C,
}

impl<C: Caller> Api<C> {
    pub fn new(caller: C) -> Self {
        Self { caller }
    }

    /// The underlying caller, for actions without a typed wrapper.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    async fn get<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T, RpcError> {
        let data = self.caller.call(action, compact(params)).await?;
        serde_json::from_value(data).map_err(|source| RpcError::UnexpectedReply {
            action: action.to_string(),
            source,
        })
    }

    async fn run(&self, action: &str, params: Value) -> Result<(), RpcError> {
        self.caller.call(action, compact(params)).await.map(drop)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub async fn send_private_msg(&self, user_id: i64, message: &[Segment]) -> Result<i64, RpcError> {
        let data: MessageId = self
            .get("send_private_msg", json!({ "user_id": user_id, "message": message }))
            .await?;
        Ok(data.message_id)
    }

    pub async fn send_group_msg(&self, group_id: i64, message: &[Segment]) -> Result<i64, RpcError> {
        let data: MessageId = self
            .get("send_group_msg", json!({ "group_id": group_id, "message": message }))
            .await?;
        Ok(data.message_id)
    }

    /// Sends a forward bundle; `messages` is a list of `node` segments.
    pub async fn send_private_forward_msg(
        &self,
        user_id: i64,
        messages: &[Segment],
    ) -> Result<i64, RpcError> {
        let data: MessageId = self
            .get(
                "send_private_forward_msg",
                json!({ "user_id": user_id, "messages": messages }),
            )
            .await?;
        Ok(data.message_id)
    }

    pub async fn send_group_forward_msg(
        &self,
        group_id: i64,
        messages: &[Segment],
    ) -> Result<i64, RpcError> {
        let data: MessageId = self
            .get(
                "send_group_forward_msg",
                json!({ "group_id": group_id, "messages": messages }),
            )
            .await?;
        Ok(data.message_id)
    }

    pub async fn delete_msg(&self, message_id: i64) -> Result<(), RpcError> {
        self.run("delete_msg", json!({ "message_id": message_id })).await
    }

    pub async fn get_msg(&self, message_id: i64) -> Result<MessageEvent, RpcError> {
        self.get("get_msg", json!({ "message_id": message_id })).await
    }

    /// Group history ending at `message_seq` (latest when `None`), oldest first.
    pub async fn get_group_msg_history(
        &self,
        group_id: i64,
        message_seq: Option<i64>,
    ) -> Result<Vec<MessageEvent>, RpcError> {
        let history: History = self
            .get(
                "get_group_msg_history",
                json!({ "group_id": group_id, "message_seq": message_seq }),
            )
            .await?;
        Ok(history.messages)
    }

    // -----------------------------------------------------------------------
    // Accounts and groups
    // -----------------------------------------------------------------------

    pub async fn get_login_info(&self) -> Result<LoginInfo, RpcError> {
        self.get("get_login_info", json!({})).await
    }

    pub async fn get_stranger_info(&self, user_id: i64) -> Result<StrangerInfo, RpcError> {
        self.get("get_stranger_info", json!({ "user_id": user_id })).await
    }

    pub async fn get_friend_list(&self) -> Result<Vec<FriendInfo>, RpcError> {
        self.get("get_friend_list", json!({})).await
    }

    pub async fn delete_friend(&self, user_id: i64) -> Result<(), RpcError> {
        self.run("delete_friend", json!({ "user_id": user_id })).await
    }

    pub async fn get_group_info(&self, group_id: i64) -> Result<GroupInfo, RpcError> {
        self.get("get_group_info", json!({ "group_id": group_id })).await
    }

    pub async fn get_group_list(&self) -> Result<Vec<GroupInfo>, RpcError> {
        self.get("get_group_list", json!({})).await
    }

    pub async fn get_group_member_info(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<GroupMemberInfo, RpcError> {
        self.get(
            "get_group_member_info",
            json!({ "group_id": group_id, "user_id": user_id }),
        )
        .await
    }

    pub async fn get_group_member_list(
        &self,
        group_id: i64,
    ) -> Result<Vec<GroupMemberInfo>, RpcError> {
        self.get("get_group_member_list", json!({ "group_id": group_id }))
            .await
    }

    // -----------------------------------------------------------------------
    // Requests and moderation
    // -----------------------------------------------------------------------

    pub async fn set_friend_add_request(
        &self,
        flag: &str,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<(), RpcError> {
        self.run(
            "set_friend_add_request",
            json!({ "flag": flag, "approve": approve, "remark": remark }),
        )
        .await
    }

    /// `sub_type` is `add` or `invite`, matching the request event.
    pub async fn set_group_add_request(
        &self,
        flag: &str,
        sub_type: &str,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<(), RpcError> {
        self.run(
            "set_group_add_request",
            json!({ "flag": flag, "sub_type": sub_type, "approve": approve, "reason": reason }),
        )
        .await
    }

    pub async fn set_group_kick(
        &self,
        group_id: i64,
        user_id: i64,
        reject_add_request: bool,
    ) -> Result<(), RpcError> {
        self.run(
            "set_group_kick",
            json!({
                "group_id": group_id,
                "user_id": user_id,
                "reject_add_request": reject_add_request,
            }),
        )
        .await
    }

    /// Mutes a member for `duration` seconds; `0` lifts the mute.
    pub async fn set_group_ban(
        &self,
        group_id: i64,
        user_id: i64,
        duration: i64,
    ) -> Result<(), RpcError> {
        self.run(
            "set_group_ban",
            json!({ "group_id": group_id, "user_id": user_id, "duration": duration }),
        )
        .await
    }

    pub async fn set_group_whole_ban(&self, group_id: i64, enable: bool) -> Result<(), RpcError> {
        self.run(
            "set_group_whole_ban",
            json!({ "group_id": group_id, "enable": enable }),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    /// Has the implementation fetch `url` and returns the local path.
    pub async fn download_file(&self, url: &str) -> Result<String, RpcError> {
        let data: DownloadedFile = self.get("download_file", json!({ "url": url })).await?;
        Ok(data.file)
    }

    pub async fn upload_private_file(
        &self,
        user_id: i64,
        file: &str,
        name: &str,
    ) -> Result<(), RpcError> {
        self.run(
            "upload_private_file",
            json!({ "user_id": user_id, "file": file, "name": name }),
        )
        .await
    }

    pub async fn upload_group_file(
        &self,
        group_id: i64,
        file: &str,
        name: &str,
        folder: Option<&str>,
    ) -> Result<(), RpcError> {
        self.run(
            "upload_group_file",
            json!({ "group_id": group_id, "file": file, "name": name, "folder": folder }),
        )
        .await
    }
}
