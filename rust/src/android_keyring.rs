//! JNI entry point that prepares the Android keystore for the session store.
//!
//! The signed-in session (user id plus access and refresh tokens) is kept in
//! the keystore through `keyring-core`. Its Android backend reads the app
//! context from `ndk-context`, which a JNA-loaded library never gets, so the
//! host hands it over from `com.artisthub.app.Keyring.init(Context)` before
//! constructing `FfiApp`. Without that call `SessionStore::open` falls back to
//! the data-dir file.

#![cfg(target_os = "android")]

use std::ffi::c_void;
use std::sync::OnceLock;

use jni::objects::{JClass, JObject};
use jni::JNIEnv;

static INIT: OnceLock<()> = OnceLock::new();

#[no_mangle]
pub extern "system" fn Java_com_artisthub_app_Keyring_init(
    env: JNIEnv,
    _class: JClass,
    context: JObject,
) {
    // First call wins.
    if INIT.set(()).is_err() {
        return;
    }

    // ndk-context keeps the raw pointer for the process lifetime, so the global ref is leaked.
    let global_ctx = match env.new_global_ref(context) {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!(%e, "keyring init: global ref failed");
            return;
        }
    };

    let vm = match env.get_java_vm() {
        Ok(vm) => vm,
        Err(e) => {
            tracing::warn!(%e, "keyring init: no java vm");
            return;
        }
    };

    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer().cast::<c_void>(),
            global_ctx.as_obj().as_raw().cast::<c_void>(),
        );
    }
    std::mem::forget(global_ctx);

    // No keychain access groups on Android.
    if let Err(e) = crate::session_store::init_keyring_once("") {
        tracing::warn!(err = format!("{e:#}"), "keyring init failed");
    }
}
