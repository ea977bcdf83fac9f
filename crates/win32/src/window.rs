//! The Win32 transport: service lookup, synchronous requests, and
//! message-only reply windows.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;
use std::time::Duration;

use protocol::{
    EndpointId, MessageKind, NativeError, PumpStatus, ReplyEndpoint, ReplySink, SendFailure,
    ServiceRequest, Transport, WaitStatus, QUERY_COPYDATA_TAG,
};
use tracing::{debug, trace, warn};
use windows_sys::Win32::Foundation::{
    GetLastError, SetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT,
    WAIT_FAILED, WAIT_TIMEOUT, WPARAM,
};
use windows_sys::Win32::System::DataExchange::COPYDATASTRUCT;
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    ChangeWindowMessageFilterEx, CreateWindowExW, DefWindowProcW, DestroyWindow,
    DispatchMessageW, FindWindowW, GetClassInfoExW, MsgWaitForMultipleObjects, PeekMessageW,
    PostQuitMessage, RegisterClassExW, SendMessageW, TranslateMessage, CREATESTRUCTW,
    GWLP_USERDATA, HWND_MESSAGE, MSG, MSGFLT_ALLOW, PM_REMOVE, QS_ALLINPUT, QS_ALLPOSTMESSAGE,
    WM_COMMAND, WM_COPYDATA, WM_NCCREATE, WM_QUIT, WM_USER, WNDCLASSEXW,
};

use crate::{endpoint_id_for, send_failure_from, to_wide, QuitTracker};

/// Window class registered for reply windows.
pub const REPLY_WINDOW_CLASS: &str = "EVQ_REPLY_ENDPOINT";

/// Handle to the service's receiving window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow(HWND);

/// [`Transport`] over Win32 window messages.
///
/// Creating one registers the reply window class for the process (a second
/// instance reuses the existing registration). The class stays registered
/// for the life of the process.
#[derive(Debug)]
pub struct Win32Transport {
    instance: HINSTANCE,
    reply_class: Vec<u16>,
}

impl Win32Transport {
    pub fn new() -> Result<Self, NativeError> {
        // SAFETY: a null module name returns the handle of the running
        // executable, which outlives the transport.
        let instance = unsafe { GetModuleHandleW(ptr::null()) };
        if instance == 0 {
            return Err(last_error());
        }
        let transport = Self {
            instance,
            reply_class: to_wide(REPLY_WINDOW_CLASS),
        };
        transport.register_reply_class()?;
        Ok(transport)
    }

    fn register_reply_class(&self) -> Result<(), NativeError> {
        // SAFETY: both structures are fully initialised and the class name
        // buffer is owned by `self`.
        unsafe {
            let mut existing: WNDCLASSEXW = std::mem::zeroed();
            existing.cbSize = std::mem::size_of::<WNDCLASSEXW>() as u32;
            if GetClassInfoExW(self.instance, self.reply_class.as_ptr(), &mut existing) != 0 {
                trace!("Reply window class already registered");
                return Ok(());
            }

            let mut class: WNDCLASSEXW = std::mem::zeroed();
            class.cbSize = std::mem::size_of::<WNDCLASSEXW>() as u32;
            class.lpfnWndProc = Some(reply_window_proc);
            class.hInstance = self.instance;
            class.lpszClassName = self.reply_class.as_ptr();
            if RegisterClassExW(&class) == 0 {
                let error = last_error();
                if error.code != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(error);
                }
            }
        }
        debug!(class = REPLY_WINDOW_CLASS, "Registered reply window class");
        Ok(())
    }
}

impl Transport for Win32Transport {
    type Service = ServiceWindow;
    type Endpoint = ReplyWindow;

    fn locate_service(&self, class: &str) -> Option<ServiceWindow> {
        let class = to_wide(class);
        // SAFETY: the class name is NUL-terminated and outlives the call.
        let hwnd = unsafe { FindWindowW(class.as_ptr(), ptr::null()) };
        (hwnd != 0).then_some(ServiceWindow(hwnd))
    }

    fn send_request(
        &self,
        service: ServiceWindow,
        request: ServiceRequest,
    ) -> Result<u32, NativeError> {
        let message = match request.kind() {
            MessageKind::Ipc => WM_USER,
            MessageKind::Command => WM_COMMAND,
        };
        // SAFETY: plain integer message; the last error is reset first so a
        // zero answer can be told apart from a failure.
        let (answer, error) = unsafe {
            SetLastError(0);
            let answer = SendMessageW(service.0, message, request.code() as WPARAM, 0);
            (answer, GetLastError())
        };
        if answer == 0 && error != 0 {
            return Err(NativeError::new(error));
        }
        Ok(answer as u32)
    }

    fn open_endpoint(&self, sink: ReplySink) -> Result<ReplyWindow, NativeError> {
        let query_id = sink.query_id();
        let sink = Box::into_raw(Box::new(sink));

        // SAFETY: the class is registered by `new`; `sink` is handed to the
        // window in WM_NCCREATE and reclaimed when the window is destroyed.
        let hwnd = unsafe {
            CreateWindowExW(
                0,
                self.reply_class.as_ptr(),
                self.reply_class.as_ptr(),
                0,
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                0,
                self.instance,
                sink as *const c_void,
            )
        };
        if hwnd == 0 {
            let error = last_error();
            // SAFETY: window creation failed, so nothing else holds `sink`.
            drop(unsafe { Box::from_raw(sink) });
            return Err(error);
        }

        // Replies come from the service process, which may run at a higher
        // integrity level.
        // SAFETY: `hwnd` was just created on this thread.
        if unsafe { ChangeWindowMessageFilterEx(hwnd, WM_COPYDATA, MSGFLT_ALLOW, ptr::null_mut()) }
            == 0
        {
            warn!(error = last_error().code, "Could not allow WM_COPYDATA through the message filter");
        }

        debug!(query_id = %query_id, hwnd, "Opened reply window");
        Ok(ReplyWindow {
            hwnd,
            sink,
            quits: QuitTracker::new(),
            _thread_bound: PhantomData,
        })
    }

    fn send_query(
        &self,
        service: ServiceWindow,
        endpoint: &ReplyWindow,
        payload: &[u8],
    ) -> Result<(), SendFailure> {
        let data = COPYDATASTRUCT {
            dwData: QUERY_COPYDATA_TAG as usize,
            cbData: payload.len() as u32,
            lpData: payload.as_ptr() as *mut c_void,
        };
        // SAFETY: `data` and `payload` outlive the synchronous send.
        let (accepted, error) = unsafe {
            SetLastError(0);
            let accepted = SendMessageW(
                service.0,
                WM_COPYDATA,
                endpoint.hwnd as WPARAM,
                &data as *const COPYDATASTRUCT as LPARAM,
            );
            (accepted, GetLastError())
        };
        if accepted == 0 {
            return Err(send_failure_from(error));
        }
        Ok(())
    }
}

/// A message-only window that receives one query's reply.
///
/// Bound to the thread that created it: its messages are only ever pumped
/// there. Dropping it destroys the window.
#[derive(Debug)]
pub struct ReplyWindow {
    hwnd: HWND,
    sink: *mut ReplySink,
    quits: QuitTracker,
    _thread_bound: PhantomData<*const ()>,
}

impl ReplyEndpoint for ReplyWindow {
    fn id(&self) -> EndpointId {
        endpoint_id_for(self.hwnd)
    }

    fn pump(&mut self) -> PumpStatus {
        // SAFETY: `MSG` is plain data filled in by PeekMessageW, and the sink
        // lives until the window is dropped.
        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            while PeekMessageW(&mut msg, 0, 0, 0, PM_REMOVE) != 0 {
                if msg.message == WM_QUIT {
                    if self.quits.on_quit(msg.wParam as i32, (*self.sink).has_reply()) {
                        return PumpStatus::ReplyReceived;
                    }
                    debug!(exit_code = msg.wParam as i32, "Holding the host's quit until the query ends");
                    continue;
                }
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        PumpStatus::Drained
    }

    fn wait(&mut self, timeout: Duration) -> WaitStatus {
        // Rounded up so a sub-millisecond remainder does not spin.
        let millis = u32::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u32::MAX - 1);
        // SAFETY: no handles are passed; only the thread's queue is watched.
        let status = unsafe {
            MsgWaitForMultipleObjects(0, ptr::null(), 0, millis, QS_ALLINPUT | QS_ALLPOSTMESSAGE)
        };
        if status == WAIT_TIMEOUT {
            return WaitStatus::TimedOut;
        }
        if status == WAIT_FAILED {
            warn!(error = last_error().code, "Waiting for messages failed");
            std::thread::sleep(timeout);
            return WaitStatus::TimedOut;
        }
        WaitStatus::MessagesPending
    }
}

impl Drop for ReplyWindow {
    fn drop(&mut self) {
        // SAFETY: the window is destroyed before the sink it points at is
        // freed, so the window procedure can no longer reach it.
        unsafe {
            if DestroyWindow(self.hwnd) == 0 {
                warn!(error = last_error().code, hwnd = self.hwnd, "Could not destroy reply window");
            }
            let reply_stored = (*self.sink).has_reply();
            drop(Box::from_raw(self.sink));

            // This window's own quit must not end the next query's wait on
            // this thread.
            if self.quits.own_quit_pending(reply_stored) {
                let mut msg: MSG = std::mem::zeroed();
                PeekMessageW(&mut msg, 0, WM_QUIT, WM_QUIT, PM_REMOVE);
            }
            if let Some(exit_code) = self.quits.host_exit_code() {
                debug!(exit_code, "Re-posting the host's quit");
                PostQuitMessage(exit_code);
            }
        }
        trace!(hwnd = self.hwnd, "Closed reply window");
    }
}

fn last_error() -> NativeError {
    // SAFETY: reads thread-local state only.
    NativeError::new(unsafe { GetLastError() })
}

#[cfg(target_pointer_width = "64")]
unsafe fn store_sink(hwnd: HWND, sink: *mut ReplySink) {
    windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW(hwnd, GWLP_USERDATA, sink as isize);
}

#[cfg(target_pointer_width = "32")]
unsafe fn store_sink(hwnd: HWND, sink: *mut ReplySink) {
    windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongW(hwnd, GWLP_USERDATA, sink as i32);
}

#[cfg(target_pointer_width = "64")]
unsafe fn load_sink(hwnd: HWND) -> *const ReplySink {
    windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const ReplySink
}

#[cfg(target_pointer_width = "32")]
unsafe fn load_sink(hwnd: HWND) -> *const ReplySink {
    windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongW(hwnd, GWLP_USERDATA) as *const ReplySink
}

unsafe extern "system" fn reply_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_NCCREATE => {
            let create = &*(lparam as *const CREATESTRUCTW);
            store_sink(hwnd, create.lpCreateParams as *mut ReplySink);
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }
        WM_COPYDATA => {
            let sink = load_sink(hwnd);
            let data = lparam as *const COPYDATASTRUCT;
            if sink.is_null() || data.is_null() {
                return DefWindowProcW(hwnd, msg, wparam, lparam);
            }
            let data = &*data;
            let payload: &[u8] = if data.lpData.is_null() || data.cbData == 0 {
                &[]
            } else {
                std::slice::from_raw_parts(data.lpData as *const u8, data.cbData as usize)
            };
            if (*sink).accept(data.dwData as u64, payload) {
                PostQuitMessage(0);
                1
            } else {
                DefWindowProcW(hwnd, msg, wparam, lparam)
            }
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
