use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use qualifier_core::console::LineAssembler;

use super::{CONSOLE_LINES, CONSOLE_REPLIES};
use crate::console::{self, PROMPT, REPLY_LEN};

const CONSOLE_BAUD: u32 = 115_200;
const RX_BUFFER_SIZE: usize = 128;

static mut UART_TX_BUFFER: [u8; REPLY_LEN] = [0; REPLY_LEN];
static mut UART_RX_BUFFER: [u8; RX_BUFFER_SIZE] = [0; RX_BUFFER_SIZE];

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART2_LPUART2 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART2>;
});

#[embassy_executor::task]
pub async fn run(
    usart: Peri<'static, hal::peripherals::USART2>,
    tx_pin: Peri<'static, hal::peripherals::PA2>,
    rx_pin: Peri<'static, hal::peripherals::PA3>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = CONSOLE_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            usart,
            rx_pin,
            tx_pin,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            config,
        )
        .expect("failed to initialize console UART")
    };

    let (mut uart_tx, mut uart_rx) = uart.split();

    let replies = async move {
        if uart_tx.write_all(PROMPT.as_bytes()).await.is_err() {
            defmt::warn!("console: UART write error");
        }
        loop {
            let reply = CONSOLE_REPLIES.receive().await;
            if uart_tx.write_all(reply.as_bytes()).await.is_err()
                || uart_tx.flush().await.is_err()
            {
                defmt::warn!("console: UART write error");
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    };

    let lines = async move {
        let mut assembler = LineAssembler::new();
        let mut ingress = [0u8; RX_BUFFER_SIZE];
        loop {
            let count = match uart_rx.read(&mut ingress).await {
                Ok(count) => count,
                Err(_) => {
                    defmt::warn!("console: UART read error");
                    assembler.clear();
                    Timer::after(Duration::from_millis(5)).await;
                    continue;
                }
            };

            for &byte in &ingress[..count] {
                match assembler.push(byte) {
                    Ok(Some(line)) => CONSOLE_LINES.send(line).await,
                    Ok(None) => {}
                    Err(error) => CONSOLE_REPLIES.send(console::reject(error)).await,
                }
            }
        }
    };

    join(replies, lines).await;
    loop {
        core::future::pending::<()>().await;
    }
}
