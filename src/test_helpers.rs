use assert_call::call;

/// Records `name` as a call when dropped.
pub struct CallOnDrop(String);

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        call!("{}", self.0);
    }
}

pub fn call_on_drop(name: impl Into<String>) -> CallOnDrop {
    CallOnDrop(name.into())
}
