use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// The animated source's header/signature was not recognized,
        /// or a frame declared a region outside the logical canvas.
        MalformedContainer(msg: String) {
            display("unrecognized animation container: {}", msg)
        }
        /// The byte stream ended in the middle of a declared frame.
        TruncatedData {
            display("animation data ended mid-frame")
        }
        /// The container parsed cleanly but declared no frames.
        EmptyAnimation {
            display("animation contains no frames")
        }
        /// A layer locator could not be read at all.
        ResourceUnavailable(msg: String) {
            display("can't read layer: {}", msg)
        }
        /// The layer bytes are not a raster this engine can composite.
        UnsupportedFormat(msg: String) {
            display("unsupported layer format: {}", msg)
        }
        /// Allocating or scaling an output surface failed; the job is aborted.
        SurfaceAllocationFailed {
            display("failed to allocate frame surface")
            from(std::collections::TryReserveError)
            from(resize::Error)
        }
        /// `finalize()` was called before any frame was pushed.
        NoFramesToEncode {
            display("no frames were queued for encoding")
        }
        EncodingFailed(msg: String) {
            display("GIF encoding failed: {}", msg)
            from(e: imagequant::liq_error) -> (e.to_string())
        }
        /// The job's cancellation token was tripped at a yield point.
        Cancelled {
            display("job cancelled")
        }
        /// Internal error
        ThreadSend {
            display("internal error; encoder worker unexpectedly aborted")
        }
    }
}

pub type JobResult<T, E = Error> = Result<T, E>;

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        Self::EncodingFailed(err.to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    #[cold]
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::ThreadSend
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    #[cold]
    fn from(_: crossbeam_channel::RecvError) -> Self {
        Self::ThreadSend
    }
}
