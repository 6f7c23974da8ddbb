use jni::errors::Error as JniError;
use jni::objects::{JObjectArray, JString};
use jni::sys::jsize;
use jni::JNIEnv;

use crate::host::{Host, HostError};

/// Local references made while reading one string; released with the frame.
const LOCAL_FRAME_CAPACITY: i32 = 4;

/// A JVM caller: `(String appName, String[] args)` plus its `JNIEnv`.
pub struct JniHost<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    app_name: &'a JString<'local>,
    args: &'a JObjectArray<'local>,
}

impl<'a, 'local> JniHost<'a, 'local> {
    pub fn new(
        env: &'a mut JNIEnv<'local>,
        app_name: &'a JString<'local>,
        args: &'a JObjectArray<'local>,
    ) -> Self {
        JniHost {
            env,
            app_name,
            args,
        }
    }

    fn clear_pending(&mut self, err: HostError) -> HostError {
        if err == HostError::Exception {
            let _ = self.env.exception_clear();
        }
        err
    }
}

impl From<JniError> for HostError {
    fn from(err: JniError) -> Self {
        match err {
            JniError::NullPtr(_) | JniError::NullDeref(_) => HostError::Null,
            JniError::JavaException => HostError::Exception,
            other => HostError::Other(other.to_string()),
        }
    }
}

fn read_string(env: &mut JNIEnv<'_>, s: &JString<'_>) -> Result<String, HostError> {
    if s.as_raw().is_null() {
        return Err(HostError::Null);
    }
    let s: String = env.get_string(s)?.into();
    Ok(s)
}

impl Host for JniHost<'_, '_> {
    fn program_name(&mut self) -> Result<String, HostError> {
        let app_name = self.app_name;
        self.env
            .with_local_frame(LOCAL_FRAME_CAPACITY, |env| read_string(env, app_name))
            .map_err(|err| self.clear_pending(err))
    }

    fn arg_count(&mut self) -> Result<usize, HostError> {
        if self.args.as_raw().is_null() {
            return Ok(0);
        }
        let len = self
            .env
            .get_array_length(self.args)
            .map_err(HostError::from)
            .map_err(|err| self.clear_pending(err))?;
        usize::try_from(len).map_err(|_| HostError::Other(format!("negative array length {len}")))
    }

    fn arg(&mut self, index: usize) -> Result<String, HostError> {
        let index = jsize::try_from(index)
            .map_err(|_| HostError::Other(format!("argument index {index} out of range")))?;
        let args = self.args;
        self.env
            .with_local_frame(LOCAL_FRAME_CAPACITY, |env| {
                let element = env.get_object_array_element(args, index)?;
                read_string(env, &JString::from(element))
            })
            .map_err(|err| self.clear_pending(err))
    }

    fn throw(&mut self, class: &str, msg: &str) {
        let _ = self.env.throw_new(class, msg);
    }

    fn fatal_error(&mut self, msg: &str) -> ! {
        self.env.fatal_error(msg)
    }
}
