use wasm_bindgen_futures::JsFuture;

pub(crate) fn now_ms() -> i64 {
    js_sys::Date::now().round() as i64
}

/// Write `text` to the system clipboard.
pub(crate) async fn copy_to_clipboard(text: &str) -> Result<(), String> {
    let window = web_sys::window().ok_or_else(|| "no window".to_string())?;
    let promise = window.navigator().clipboard().write_text(text);
    JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| format!("{e:?}"))
}
