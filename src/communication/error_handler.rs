use crate::backend::BackendError;

// Maps an upstream failure to the message shown to the user. Backend
// rejections carry the backend's own message; everything else gets a
// generic apology.
pub fn backend_error_to_user_message(error: &BackendError) -> String {
    match error {
        BackendError::Rejected(message) => message.clone(),
        _ => "Something went wrong".to_string(),
    }
}
