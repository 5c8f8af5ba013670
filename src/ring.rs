use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::ready;
use iou::{SQE, SQEs};

use crate::completion::Completion;
use crate::drive::{Completion as ExternalCompletion, Drive};
use crate::drive::demo::DemoDriver;
use crate::event::Cancellation;

use State::*;

/// The single-request completion state machine shared by every io-uring operation this crate
/// submits: [`crate::Submission`], file handles, and socket handles all drive one of these per
/// outstanding event.
pub struct Ring<D: Drive = DemoDriver> {
    state: State,
    completion: Option<Completion>,
    driver: D,
}

#[derive(Debug, Eq, PartialEq)]
enum State {
    Inert = 0,
    Prepared,
    Submitted,
    Lost,
}

impl<D: Drive> Ring<D> {
    pub fn new(driver: D) -> Ring<D> {
        Ring { state: Inert, completion: None, driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Drive one event through prepare, submit and completion.
    ///
    /// `prepare` is handed the `SQEs` allotted by the driver and must write exactly one `SQE`
    /// into it; this mirrors [`crate::event::Event::prepare`], which this method exists to drive.
    pub fn poll(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        eager: bool,
        count: u32,
        prepare: impl FnOnce(&mut SQEs<'_>) -> SQE<'_>,
    ) -> Poll<io::Result<usize>> {
        match self.state {
            Inert => {
                ready!(self.as_mut().try_prepare(ctx, count, prepare));
                if eager {
                    let _ = self.as_mut().try_submit(ctx);
                }
                Poll::Pending
            }
            Prepared => match self.as_mut().try_complete(ctx) {
                ready @ Poll::Ready(..) => ready,
                Poll::Pending => {
                    let _ = self.as_mut().try_submit(ctx);
                    Poll::Pending
                }
            },
            Submitted => self.try_complete(ctx),
            Lost => panic!("ring in a bad state; driver is faulty"),
        }
    }

    fn try_prepare(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        count: u32,
        prepare: impl FnOnce(&mut SQEs<'_>) -> SQE<'_>,
    ) -> Poll<()> {
        unsafe {
            let this = self.as_mut().get_unchecked_mut();
            this.state = Lost;
            let completion = ready!(Pin::new_unchecked(&mut this.driver).poll_prepare(
                ctx,
                count,
                |mut sqes, cx| {
                    let sqe = prepare(&mut sqes);
                    ExternalCompletion::new(sqe, sqes, cx)
                },
            ));
            this.state = Prepared;
            this.completion = Some(completion.real);
        }
        Poll::Ready(())
    }

    fn try_submit(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<()> {
        unsafe {
            let this = self.as_mut().get_unchecked_mut();
            let _ = ready!(Pin::new_unchecked(&mut this.driver).poll_submit(ctx));
            this.state = Submitted;
        }
        Poll::Ready(())
    }

    fn try_complete(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        unsafe {
            let this = self.as_mut().get_unchecked_mut();
            match this.completion.take() {
                Some(completion) => match completion.check(ctx.waker()) {
                    Ok(result) => {
                        this.state = Inert;
                        Poll::Ready(result)
                    }
                    Err(completion) => {
                        this.completion = Some(completion);
                        Poll::Pending
                    }
                },
                None => Poll::Pending,
            }
        }
    }

    pub fn cancel(mut self: Pin<&mut Self>, cancellation: Cancellation) {
        unsafe {
            let this = self.as_mut().get_unchecked_mut();
            match this.completion.take() {
                Some(completion) => completion.cancel(cancellation),
                None => drop(cancellation),
            }
        }
    }
}
